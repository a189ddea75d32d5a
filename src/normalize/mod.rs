//! Field normalization
//!
//! Converts one raw record into a flat, ordered mapping of output-ready
//! strings. Every exported schema field appears exactly once, and structured
//! values (relationships, attachments, areas) are resolved to one string.
//!
//! Normalization does no I/O. Unknown field types and unexpected value
//! shapes degrade to empty cells; only values that cannot be read at all
//! (or a rejecting hook) fail the record.

mod content;
mod scalar;

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};

use crate::error::RecordError;
use crate::schema::{Field, FieldType, ID_FIELD, Schema};

pub use content::{ContentResolver, DefaultContentResolver, RICH_TEXT_WIDGET, html_to_plain_text};
pub use scalar::{BsonConverter, PlainTextConverter};

/// Delimiter between related record titles.
pub const RELATIONSHIP_DELIMITER: &str = ",";

/// Hook run after a record is normalized
///
/// Receives the raw record and may rewrite or add values. Returning an error
/// marks the record as failed.
pub type BeforeExport =
    Arc<dyn Fn(&Document, &mut NormalizedRecord) -> Result<(), RecordError> + Send + Sync>;

/// A record flattened to output-ready strings, in column order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    id: String,
    values: Vec<(String, String)>,
}

impl NormalizedRecord {
    /// Create a record holding only its identifier
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            values: vec![(ID_FIELD.to_string(), id.clone())],
            id,
        }
    }

    /// Stable identifier of the source record
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Value of a field, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set a field, replacing an existing value in place or appending
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    /// Values laid out for the given columns; missing columns are empty
    pub fn row<'a>(&'a self, columns: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
        columns.iter().map(|column| self.get(column).unwrap_or(""))
    }

    /// Field names and values in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Values for `columns`, then every field outside them in insertion order
    pub fn entries<'a>(
        &'a self,
        columns: &'a [String],
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let extra = self
            .iter()
            .filter(move |(name, _)| !columns.iter().any(|column| column == name));
        columns
            .iter()
            .map(|column| (column.as_str(), self.get(column).unwrap_or("")))
            .chain(extra)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Converts raw records of one type into [`NormalizedRecord`]s
#[derive(Clone)]
pub struct FieldNormalizer {
    schema: Arc<Schema>,
    omit: Vec<String>,
    resolver: Arc<dyn ContentResolver>,
    hook: Option<BeforeExport>,
}

impl fmt::Debug for FieldNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldNormalizer")
            .field("schema", &self.schema.name)
            .field("omit", &self.omit)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl FieldNormalizer {
    /// Create a normalizer with the default content resolver and no hook
    pub fn new(schema: Arc<Schema>, omit: Vec<String>) -> Self {
        Self {
            schema,
            omit,
            resolver: Arc::new(DefaultContentResolver::default()),
            hook: None,
        }
    }

    /// Use a different resolver for attachments and areas
    pub fn with_resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Run `hook` on every record after normalization
    pub fn with_hook(mut self, hook: BeforeExport) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Output columns this normalizer produces
    pub fn columns(&self) -> Vec<String> {
        self.schema.columns(&self.omit)
    }

    /// Exported schema fields, without the identifier column
    pub fn field_columns(&self) -> Vec<String> {
        self.schema.field_columns(&self.omit)
    }

    /// Normalize one raw record
    pub fn normalize(&self, raw: &Document) -> Result<NormalizedRecord, RecordError> {
        let converter = PlainTextConverter::new();

        let id = match raw.get(ID_FIELD) {
            Some(Bson::Null) | None => {
                return Err(RecordError::InvalidValue {
                    field: ID_FIELD.to_string(),
                    message: "record has no identifier".to_string(),
                });
            }
            Some(value) => converter.convert(value),
        };

        let mut record = NormalizedRecord::new(id);

        for field in self.schema.exported_fields(&self.omit) {
            let value = self.normalize_field(field, raw.get(&field.name), &converter)?;
            record.set(field.name.clone(), value);
        }

        if let Some(hook) = &self.hook {
            hook(raw, &mut record)?;
        }

        Ok(record)
    }

    fn normalize_field(
        &self,
        field: &Field,
        value: Option<&Bson>,
        converter: &PlainTextConverter,
    ) -> Result<String, RecordError> {
        let Some(value) = value else {
            return Ok(String::new());
        };

        match value {
            Bson::Document(_) | Bson::Array(_) | Bson::Null => self.normalize_structured(field, value),
            scalar => Ok(converter.convert(scalar)),
        }
    }

    fn normalize_structured(&self, field: &Field, value: &Bson) -> Result<String, RecordError> {
        match (&field.field_type, value) {
            (FieldType::Relationship, Bson::Array(items)) => {
                // Items that are not documents have no title and contribute ""
                let titles: Vec<&str> = items
                    .iter()
                    .map(|item| match item {
                        Bson::Document(related) => related.get_str("title").unwrap_or_default(),
                        _ => "",
                    })
                    .collect();
                Ok(titles.join(RELATIONSHIP_DELIMITER))
            }
            (FieldType::Relationship, Bson::Document(_)) => Err(RecordError::InvalidValue {
                field: field.name.clone(),
                message: "relationship is not a list".to_string(),
            }),
            (FieldType::Attachment, Bson::Document(attachment)) => {
                Ok(self.resolver.attachment_url(attachment).unwrap_or_default())
            }
            (FieldType::Area, Bson::Document(area)) => {
                if field.options.export_plain_text {
                    Ok(self.resolver.plain_text(area))
                } else {
                    Ok(self.resolver.rich_text(area))
                }
            }
            _ => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use bson::doc;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new("product")
                .with_field(Field::new("title", FieldType::String))
                .with_field(Field::new("price", FieldType::Float))
                .with_field(Field::new("secret", FieldType::String))
                .with_field(Field::new("_categories", FieldType::Relationship))
                .with_field(Field::new("manual", FieldType::Attachment))
                .with_field(Field::new("body", FieldType::Area))
                .with_field(Field::plain_text_area("summary"))
                .with_field(Field::new("location", FieldType::Other("geo".into())))
                .with_field(Field::new("published", FieldType::Boolean)),
        )
    }

    fn area(content: &str) -> Bson {
        Bson::Document(doc! {
            "metaType": "area",
            "items": [{ "type": RICH_TEXT_WIDGET, "content": content }]
        })
    }

    fn raw() -> Document {
        doc! {
            "_id": "p1",
            "title": "product #00001",
            "price": 9.5,
            "secret": "hide-me",
            "_categories": [ { "title": "Tools" }, { "title": "Garden" } ],
            "manual": { "_id": "a1", "name": "manual", "extension": "pdf" },
            "body": area("<h2>Rich</h2>"),
            "summary": area("<p>Plain</p>"),
            "location": { "lat": 1.0, "lng": 2.0 },
            "published": false,
            "notInSchema": "ignored"
        }
    }

    #[test]
    fn test_normalize_full_record() {
        let normalizer = FieldNormalizer::new(schema(), vec![]);
        let record = normalizer.normalize(&raw()).unwrap();

        assert_eq!(record.id(), "p1");
        assert_eq!(record.get("_id"), Some("p1"));
        assert_eq!(record.get("title"), Some("product #00001"));
        assert_eq!(record.get("price"), Some("9.5"));
        assert_eq!(record.get("_categories"), Some("Tools,Garden"));
        assert_eq!(record.get("manual"), Some("/uploads/attachments/a1-manual.pdf"));
        assert_eq!(record.get("body"), Some("<h2>Rich</h2>"));
        assert_eq!(record.get("summary"), Some("Plain"));
        assert_eq!(record.get("location"), Some(""));
        assert_eq!(record.get("published"), Some(""));
        assert_eq!(record.get("notInSchema"), None);
        assert_eq!(record.len(), normalizer.columns().len());
    }

    #[test]
    fn test_record_order_matches_columns() {
        let normalizer = FieldNormalizer::new(schema(), vec!["secret".to_string()]);
        let record = normalizer.normalize(&raw()).unwrap();
        let keys: Vec<&str> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, normalizer.columns());
        assert_eq!(record.get("secret"), None);
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let normalizer = FieldNormalizer::new(schema(), vec![]);
        let record = normalizer.normalize(&doc! { "_id": "p2" }).unwrap();
        assert_eq!(record.get("title"), Some(""));
        assert_eq!(record.get("_categories"), Some(""));
        assert_eq!(record.get("manual"), Some(""));
    }

    #[test]
    fn test_null_and_empty_structures() {
        let normalizer = FieldNormalizer::new(schema(), vec![]);
        let record = normalizer
            .normalize(&doc! {
                "_id": "p3",
                "_categories": [],
                "manual": Bson::Null,
                "body": Bson::Null,
                "title": ["not", "a", "string"]
            })
            .unwrap();
        assert_eq!(record.get("_categories"), Some(""));
        assert_eq!(record.get("manual"), Some(""));
        assert_eq!(record.get("body"), Some(""));
        assert_eq!(record.get("title"), Some(""));
    }

    #[test]
    fn test_relationship_items_without_title_are_empty() {
        let normalizer = FieldNormalizer::new(schema(), vec![]);
        let record = normalizer
            .normalize(&doc! { "_id": "p4", "_categories": ["Tools"] })
            .unwrap();
        assert_eq!(record.get("_categories"), Some(""));

        let record = normalizer
            .normalize(&doc! {
                "_id": "p4",
                "_categories": [ { "title": "Tools" }, 7, { "name": "untitled" }, { "title": "Garden" } ]
            })
            .unwrap();
        assert_eq!(record.get("_categories"), Some("Tools,,,Garden"));
    }

    #[test]
    fn test_relationship_that_is_not_a_list_fails_record() {
        let normalizer = FieldNormalizer::new(schema(), vec![]);
        let err = normalizer
            .normalize(&doc! { "_id": "p4", "_categories": { "title": "Tools" } })
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidValue { ref field, .. } if field == "_categories"));
    }

    #[test]
    fn test_missing_id_fails_record() {
        let normalizer = FieldNormalizer::new(schema(), vec![]);
        assert!(normalizer.normalize(&doc! { "title": "x" }).is_err());
    }

    #[test]
    fn test_hook_can_augment_and_reject() {
        let hook: BeforeExport = Arc::new(|raw: &Document, record: &mut NormalizedRecord| {
            if raw.get_bool("locked").unwrap_or(false) {
                return Err(RecordError::Hook("locked".to_string()));
            }
            let title = record.get("title").unwrap_or_default().to_uppercase();
            record.set("title", title);
            record.set("exportedBy", "hook");
            Ok(())
        });
        let normalizer = FieldNormalizer::new(schema(), vec![]).with_hook(hook);

        let record = normalizer
            .normalize(&doc! { "_id": "p5", "title": "quiet" })
            .unwrap();
        assert_eq!(record.get("title"), Some("QUIET"));
        assert_eq!(record.get("exportedBy"), Some("hook"));

        let err = normalizer
            .normalize(&doc! { "_id": "p6", "locked": true })
            .unwrap_err();
        assert_eq!(err, RecordError::Hook("locked".to_string()));
    }

    #[test]
    fn test_entries_append_fields_outside_columns() {
        let mut record = NormalizedRecord::new("r1");
        record.set("extra", "x");
        record.set("b", "2");
        let columns = vec!["_id".to_string(), "a".to_string(), "b".to_string()];
        let entries: Vec<(&str, &str)> = record.entries(&columns).collect();
        assert_eq!(entries, vec![("_id", "r1"), ("a", ""), ("b", "2"), ("extra", "x")]);
    }

    #[test]
    fn test_row_fills_missing_columns() {
        let mut record = NormalizedRecord::new("r1");
        record.set("b", "2");
        let columns = vec!["_id".to_string(), "a".to_string(), "b".to_string()];
        let row: Vec<&str> = record.row(&columns).collect();
        assert_eq!(row, vec!["r1", "", "2"]);
    }
}
