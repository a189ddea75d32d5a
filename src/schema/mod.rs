//! Record type schemas
//!
//! A schema lists the fields an exportable record type declares, in order.
//! The declared order is the column order of every export format.

use serde::{Deserialize, Serialize};

/// Name of the identifier field every record carries.
pub const ID_FIELD: &str = "_id";

/// Longest sheet title a spreadsheet accepts.
const MAX_SHEET_NAME_LEN: usize = 31;

/// Field type of a schema field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Slug,
    Select,
    /// References to other records; exported as their joined titles.
    Relationship,
    /// An uploaded file; exported as its URL.
    Attachment,
    /// Rich structured content made of widgets.
    Area,
    /// Any type this crate has no dedicated rule for.
    #[serde(untagged)]
    Other(String),
}

impl FieldType {
    /// Whether values of this type are expected to be documents or arrays.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            FieldType::Relationship | FieldType::Attachment | FieldType::Area
        )
    }
}

/// Per-field export options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOptions {
    /// Export an area as plain text instead of rich markup.
    #[serde(default)]
    pub export_plain_text: bool,
}

/// One field of a record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub options: FieldOptions,
}

impl Field {
    /// Create a field with default options
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            options: FieldOptions::default(),
        }
    }

    /// Create an area field exported as plain text
    pub fn plain_text_area(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Area,
            options: FieldOptions {
                export_plain_text: true,
            },
        }
    }
}

/// Schema of an exportable record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Type name records are stored under (e.g. `article`).
    pub name: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub plural_label: Option<String>,

    /// Collection holding the records; defaults to `aposDocs`.
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub fields: Vec<Field>,
}

fn default_collection() -> String {
    "aposDocs".to_string()
}

impl Schema {
    /// Create an empty schema for a type
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            plural_label: None,
            collection: default_collection(),
            fields: Vec::new(),
        }
    }

    /// Append a field, keeping declaration order
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the plural label used for sheet titles
    pub fn with_plural_label(mut self, label: impl Into<String>) -> Self {
        self.plural_label = Some(label.into());
        self
    }

    /// Fields that survive the omission list, in declared order
    pub fn exported_fields<'a>(&'a self, omit: &'a [String]) -> impl Iterator<Item = &'a Field> {
        self.fields
            .iter()
            .filter(move |field| field.name != ID_FIELD && !omit.contains(&field.name))
    }

    /// Output columns: the identifier, then every exported field
    pub fn columns(&self, omit: &[String]) -> Vec<String> {
        std::iter::once(ID_FIELD.to_string())
            .chain(self.field_columns(omit))
            .collect()
    }

    /// Names of the exported fields alone, in declared order
    pub fn field_columns(&self, omit: &[String]) -> Vec<String> {
        self.exported_fields(omit)
            .map(|field| field.name.clone())
            .collect()
    }

    /// Title of the spreadsheet tab for this type
    ///
    /// Uses the plural label, then the label, then the type name, with
    /// characters spreadsheets reject replaced and the length capped.
    pub fn sheet_name(&self) -> String {
        let raw = self
            .plural_label
            .as_deref()
            .or(self.label.as_deref())
            .unwrap_or(&self.name);

        let cleaned: String = raw
            .chars()
            .map(|c| match c {
                '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
                other => other,
            })
            .take(MAX_SHEET_NAME_LEN)
            .collect();

        let cleaned = cleaned.trim_matches('\'').to_string();
        if cleaned.trim().is_empty() {
            "Export".to_string()
        } else {
            cleaned
        }
    }
}
