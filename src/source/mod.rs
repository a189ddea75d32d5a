//! Record sources for export operations
//!
//! A source answers one question: "give me at most `limit` records whose
//! `_id` is greater than this key, in ascending `_id` order, that match these
//! filters". Keyset pagination on `_id` keeps pages disjoint and each record
//! visited once while the data set holds still.
//!
//! Localized document stores keep a draft and a published copy of each
//! record per locale; [`ModeFilter`] picks one of them so each record is
//! exported once.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bson::{Bson, Document, doc};

use crate::error::QueryError;
use crate::schema::ID_FIELD;

pub mod memory;
pub mod mongo;

pub use memory::MemoryRecordSource;
pub use mongo::MongoRecordSource;

/// Field flagging records moved to the archive.
pub const ARCHIVED_FIELD: &str = "archived";

/// Field holding the mode of a localized copy, `draft` or `published`.
pub const MODE_FIELD: &str = "aposMode";

/// Field holding `<locale>:<mode>` of a localized copy.
pub const LOCALE_FIELD: &str = "aposLocale";

/// Last `_id` seen by the walker
///
/// Starts empty, meaning "before every record", and only moves forward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorPosition(Option<Bson>);

impl CursorPosition {
    /// Position before the first record
    pub fn start() -> Self {
        Self(None)
    }

    /// Last key seen, if any page has been read
    pub fn last_key(&self) -> Option<&Bson> {
        self.0.as_ref()
    }

    /// Move to the `_id` of the last record of a page
    ///
    /// Empty pages leave the position unchanged.
    pub fn advance(&mut self, page: &[Document]) -> Result<(), QueryError> {
        let Some(last) = page.last() else {
            return Ok(());
        };
        let key = last
            .get(ID_FIELD)
            .filter(|key| !matches!(key, Bson::Null))
            .ok_or_else(|| QueryError::MissingKey(format!("{last}")))?;
        self.0 = Some(key.clone());
        Ok(())
    }

    /// Filter clause selecting records after this position
    pub fn clause(&self) -> Option<Document> {
        self.0.as_ref().map(|key| doc! { ID_FIELD: { "$gt": key.clone() } })
    }
}

impl fmt::Display for CursorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(key) => write!(f, "{key}"),
            None => f.write_str("<start>"),
        }
    }
}

/// Which side of the archive to export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArchivedFilter {
    /// Only archived records
    Only,
    /// Only live records
    Live,
    /// Archived and live records
    #[default]
    Both,
}

impl ArchivedFilter {
    /// Filter clause for this choice, if it restricts anything
    pub fn clause(&self) -> Option<Document> {
        match self {
            ArchivedFilter::Only => Some(doc! { ARCHIVED_FIELD: true }),
            ArchivedFilter::Live => Some(doc! { ARCHIVED_FIELD: { "$ne": true } }),
            ArchivedFilter::Both => None,
        }
    }

    /// Whether a record passes this filter
    pub fn matches(&self, record: &Document) -> bool {
        let archived = record.get_bool(ARCHIVED_FIELD).unwrap_or(false);
        match self {
            ArchivedFilter::Only => archived,
            ArchivedFilter::Live => !archived,
            ArchivedFilter::Both => true,
        }
    }
}

impl FromStr for ArchivedFilter {
    type Err = QueryError;

    /// Accepts `yes`, `no`, `both` and the empty string (both)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" => Ok(ArchivedFilter::Only),
            "no" | "false" => Ok(ArchivedFilter::Live),
            "both" | "" => Ok(ArchivedFilter::Both),
            other => Err(QueryError::InvalidFilter(format!(
                "archived must be yes, no or both, got '{other}'"
            ))),
        }
    }
}

/// Draft or published copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocMode {
    /// Working copies
    #[default]
    Draft,
    /// Published copies
    Live,
}

impl DocMode {
    /// Value stored in [`MODE_FIELD`]
    pub fn stored_value(&self) -> &'static str {
        match self {
            DocMode::Draft => "draft",
            DocMode::Live => "published",
        }
    }
}

impl fmt::Display for DocMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocMode::Draft => f.write_str("draft"),
            DocMode::Live => f.write_str("live"),
        }
    }
}

impl FromStr for DocMode {
    type Err = QueryError;

    /// Accepts `draft` (or empty) and `live` (or `published`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" | "" => Ok(DocMode::Draft),
            "live" | "published" => Ok(DocMode::Live),
            other => Err(QueryError::InvalidFilter(format!(
                "mode must be draft or live, got '{other}'"
            ))),
        }
    }
}

/// Selects one localized copy of each record
///
/// Records without a mode or locale field are not localized and always
/// pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeFilter {
    pub mode: DocMode,
    /// Locale name such as `en`; any locale when unset
    pub locale: Option<String>,
}

impl ModeFilter {
    pub fn new(mode: DocMode, locale: Option<String>) -> Self {
        Self { mode, locale }
    }

    fn locale_value(&self) -> Option<String> {
        self.locale
            .as_ref()
            .map(|locale| format!("{}:{}", locale, self.mode.stored_value()))
    }

    /// Filter clause for this selection
    pub fn clause(&self) -> Document {
        let mut clause = doc! {
            MODE_FIELD: { "$in": [self.mode.stored_value(), Bson::Null] }
        };
        if let Some(locale) = self.locale_value() {
            clause.insert(LOCALE_FIELD, doc! { "$in": [locale, Bson::Null] });
        }
        clause
    }

    /// Whether a record passes this selection
    pub fn matches(&self, record: &Document) -> bool {
        let mode_matches = match record.get(MODE_FIELD) {
            None | Some(Bson::Null) => true,
            Some(Bson::String(mode)) => mode == self.mode.stored_value(),
            Some(_) => false,
        };
        let locale_matches = match (self.locale_value(), record.get(LOCALE_FIELD)) {
            (None, _) | (_, None) | (_, Some(Bson::Null)) => true,
            (Some(expected), Some(Bson::String(locale))) => *locale == expected,
            (Some(_), Some(_)) => false,
        };
        mode_matches && locale_matches
    }
}

/// One page request
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    /// Return records strictly after this position
    pub after: CursorPosition,
    /// Maximum records in the page
    pub limit: usize,
    /// Archive side to include
    pub archived: ArchivedFilter,
    /// Draft or published copies, and which locale
    pub mode: ModeFilter,
    /// Caller predicates, forwarded verbatim
    pub filters: Document,
}

impl PageRequest {
    /// First page of a walk with no filters beyond the default mode
    pub fn first(limit: usize) -> Self {
        Self {
            after: CursorPosition::start(),
            limit,
            archived: ArchivedFilter::default(),
            mode: ModeFilter::default(),
            filters: Document::new(),
        }
    }

    /// Full query document: caller filters, archive, mode and cursor clauses
    pub fn query(&self) -> Document {
        let mut clauses: Vec<Document> = Vec::new();
        if !self.filters.is_empty() {
            clauses.push(self.filters.clone());
        }
        clauses.extend(self.archived.clause());
        clauses.push(self.mode.clause());
        clauses.extend(self.after.clause());

        match clauses.len() {
            0 => Document::new(),
            1 => clauses.remove(0),
            _ => doc! { "$and": clauses },
        }
    }
}

/// Paginated access to the records of one type
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch the next page
    ///
    /// Returns records after `request.after` in ascending `_id` order, at
    /// most `request.limit` of them. An empty page means the source is
    /// exhausted.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Document>, QueryError>;
}
