//! Export jobs and their results

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bson::Document;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::output::ExportFormat;
use crate::schema::Schema;
use crate::source::{ArchivedFilter, DocMode, ModeFilter};

/// Records per page when the caller does not choose.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Lifetime of an uploaded export when the caller does not choose.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_millis(3_600_000);

/// Namespace of public download paths.
pub const EXPORTS_PREFIX: &str = "/exports/";

/// Caller-selected export options
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Output format
    pub format: ExportFormat,
    /// Records per page, at least 1
    pub batch_size: usize,
    /// Time until the uploaded file is deleted
    pub expiration: Duration,
    /// Archive side to include
    pub archived: ArchivedFilter,
    /// Draft or published copies
    pub mode: DocMode,
    /// Locale to export; every locale when unset
    pub locale: Option<String>,
    /// Fields left out of every record
    pub omit_fields: Vec<String>,
    /// Predicates forwarded verbatim to the record source
    pub filters: Document,
    /// Who asked for the export, for the logs
    pub requester: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            batch_size: DEFAULT_BATCH_SIZE,
            expiration: DEFAULT_EXPIRATION,
            archived: ArchivedFilter::default(),
            mode: DocMode::default(),
            locale: None,
            omit_fields: Vec::new(),
            filters: Document::new(),
            requester: None,
        }
    }
}

impl ExportOptions {
    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_archived(mut self, archived: ArchivedFilter) -> Self {
        self.archived = archived;
        self
    }

    pub fn with_mode(mut self, mode: DocMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Copy selection handed to the record source
    pub fn mode_filter(&self) -> ModeFilter {
        ModeFilter::new(self.mode, self.locale.clone())
    }

    pub fn with_omitted(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.omit_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_filters(mut self, filters: Document) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    /// Check option bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// One export invocation
///
/// Owns the generated file names: a private temp name for staging and an
/// unrelated public name for the uploaded copy.
#[derive(Debug, Clone)]
pub struct ExportJob {
    id: Uuid,
    schema: Arc<Schema>,
    options: ExportOptions,
    temp_name: String,
    public_name: String,
}

impl ExportJob {
    /// Create a job, rejecting out-of-bounds options
    pub fn new(schema: Arc<Schema>, options: ExportOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        let extension = options.format.extension();

        Ok(Self {
            id: Uuid::new_v4(),
            temp_name: format!("{}-export.{}", Uuid::new_v4(), extension),
            public_name: format!("{}.{}", Uuid::new_v4(), extension),
            schema,
            options,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Staging file name, `<uuid>-export.<ext>`
    pub fn temp_name(&self) -> &str {
        &self.temp_name
    }

    /// Staging file path inside `temp_dir`
    pub fn temp_path(&self, temp_dir: &Path) -> PathBuf {
        temp_dir.join(&self.temp_name)
    }

    /// Public file name, `<uuid>.<ext>`
    pub fn public_name(&self) -> &str {
        &self.public_name
    }

    /// Public download path, also the storage key of the upload
    pub fn download_path(&self) -> String {
        format!("{}{}", EXPORTS_PREFIX, self.public_name)
    }
}

/// Outcome of a finished export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    /// Public URL of the uploaded file
    pub url: String,
    /// Download path under `/exports/`
    pub download_path: String,
    pub format: ExportFormat,
    /// Rows in the file
    pub records_written: u64,
    /// Size of the file
    pub bytes_written: u64,
    /// Records reported as exported
    pub succeeded: u64,
    /// Records reported as skipped
    pub failed: u64,
    /// When the uploaded file is scheduled for deletion
    pub expires_at: DateTime<Utc>,
}
