//! Output adapters for export operations
//!
//! An adapter turns a sequence of normalized records into bytes on disk.
//! Two strategies sit behind the one [`OutputAdapter`] contract:
//!
//! - **Streaming** adapters ([`DelimitedWriter`], [`JsonLinesWriter`]) open
//!   the destination immediately and append each record as it arrives.
//! - **Buffering** adapters ([`SpreadsheetWriter`]) keep records in memory
//!   and render the whole document when finalized, for formats that need
//!   global layout.
//!
//! [`ExportFormat`] maps an extension to its adapter; nothing else in the
//! pipeline branches on format. A [`FormatRegistry`] holds the built-in
//! formats plus any [`FormatFactory`] a caller registers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::BufWriter;

use crate::error::OutputError;
use crate::normalize::NormalizedRecord;
use crate::schema::ID_FIELD;

pub mod delimited;
pub mod jsonl;
pub mod spreadsheet;

pub use delimited::DelimitedWriter;
pub use jsonl::JsonLinesWriter;
pub use spreadsheet::SpreadsheetWriter;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
    /// One JSON object per line
    JsonLines,
    /// Excel workbook
    Xlsx,
    /// Format provided by a registered [`FormatFactory`], by extension
    Custom(&'static str),
}

impl ExportFormat {
    /// Every format, in the order they are offered
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Csv,
        ExportFormat::Tsv,
        ExportFormat::JsonLines,
        ExportFormat::Xlsx,
    ];

    /// Select a format from its file extension
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "tsv" => Some(ExportFormat::Tsv),
            "jsonl" => Some(ExportFormat::JsonLines),
            "xlsx" => Some(ExportFormat::Xlsx),
            _ => None,
        }
    }

    /// File extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::JsonLines => "jsonl",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Custom(extension) => extension,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "CSV (comma-separated values)",
            ExportFormat::Tsv => "TSV (tab-separated values)",
            ExportFormat::JsonLines => "JSON Lines (one object per line)",
            ExportFormat::Xlsx => "Excel (.xlsx)",
            ExportFormat::Custom(extension) => extension,
        }
    }

    /// Whether records are written as they arrive
    ///
    /// Custom formats answer through their factory.
    pub fn is_streaming(&self) -> bool {
        !matches!(self, ExportFormat::Xlsx)
    }

    /// Open the adapter for this format against `path`
    ///
    /// Streaming formats create the file here; buffering formats touch
    /// the disk only when finalized.
    pub async fn open(
        &self,
        path: &Path,
        layout: OutputLayout,
    ) -> Result<Box<dyn OutputAdapter>, OutputError> {
        let adapter: Box<dyn OutputAdapter> = match self {
            ExportFormat::Csv => Box::new(DelimitedWriter::open(path, layout, b',', *self).await?),
            ExportFormat::Tsv => Box::new(DelimitedWriter::open(path, layout, b'\t', *self).await?),
            ExportFormat::JsonLines => Box::new(JsonLinesWriter::open(path, layout).await?),
            ExportFormat::Xlsx => Box::new(SpreadsheetWriter::new(path, layout)),
            ExportFormat::Custom(extension) => {
                return Err(OutputError::UnsupportedFormat(extension.to_string()));
            }
        };
        Ok(adapter)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| OutputError::UnsupportedFormat(s.to_string()))
    }
}

/// Column layout shared by every adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Column names, in output order
    pub columns: Vec<String>,
    /// Title for formats with named sheets
    pub sheet_name: String,
}

impl OutputLayout {
    pub fn new(columns: Vec<String>, sheet_name: impl Into<String>) -> Self {
        Self {
            columns,
            sheet_name: sheet_name.into(),
        }
    }

    /// Append the fields of `record` the layout lacks, in record order
    ///
    /// Picks up values a hook added after normalization. The identifier is
    /// never appended; layouts that want it list it up front.
    pub fn extend_with(&mut self, record: &NormalizedRecord) {
        for (name, _) in record.iter() {
            if name != ID_FIELD && !self.columns.iter().any(|column| column == name) {
                self.columns.push(name.to_string());
            }
        }
    }
}

/// Outcome of a successfully finalized adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSummary {
    /// Format that produced the file
    pub format: ExportFormat,
    /// Path of the finished file
    pub path: PathBuf,
    /// Records accepted by `write`
    pub records_written: u64,
    /// Size of the finished file
    pub bytes_written: u64,
}

/// Contract every output adapter implements
///
/// `write` is called once per record in cursor order. `finalize` consumes the
/// adapter and resolves exactly once: either every byte is on disk or the
/// fault that prevented it is returned.
#[async_trait]
pub trait OutputAdapter: Send {
    /// Accept one normalized record
    ///
    /// A [`OutputError::Serialize`] error rejects only this record; any other
    /// error means the destination is broken.
    async fn write(&mut self, record: &NormalizedRecord) -> Result<(), OutputError>;

    /// Complete the file and report the outcome
    async fn finalize(self: Box<Self>) -> Result<OutputSummary, OutputError>;

    /// Format this adapter produces
    fn format(&self) -> ExportFormat;
}

/// Produces adapters for one output format
#[async_trait]
pub trait FormatFactory: Send + Sync {
    /// File extension, without the dot
    fn extension(&self) -> &'static str;

    /// Human-readable label
    fn label(&self) -> &str;

    /// Whether adapters write records as they arrive
    ///
    /// Buffering formats get the schema fields as columns, without the
    /// identifier.
    fn is_streaming(&self) -> bool;

    /// Open an adapter writing to `path`
    async fn open(
        &self,
        path: &Path,
        layout: OutputLayout,
    ) -> Result<Box<dyn OutputAdapter>, OutputError>;
}

#[async_trait]
impl FormatFactory for ExportFormat {
    fn extension(&self) -> &'static str {
        ExportFormat::extension(self)
    }

    fn label(&self) -> &str {
        ExportFormat::label(self)
    }

    fn is_streaming(&self) -> bool {
        ExportFormat::is_streaming(self)
    }

    async fn open(
        &self,
        path: &Path,
        layout: OutputLayout,
    ) -> Result<Box<dyn OutputAdapter>, OutputError> {
        ExportFormat::open(self, path, layout).await
    }
}

/// Formats available to an exporter, keyed by extension
///
/// Starts with the built-in formats. Registering a factory under an
/// existing extension replaces that format.
#[derive(Clone)]
pub struct FormatRegistry {
    formats: Vec<Arc<dyn FormatFactory>>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self {
            formats: ExportFormat::ALL
                .iter()
                .map(|format| Arc::new(*format) as Arc<dyn FormatFactory>)
                .collect(),
        }
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.formats.iter().map(|format| format.extension()))
            .finish()
    }
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a format, replacing any format with the same extension
    pub fn register(&mut self, factory: Arc<dyn FormatFactory>) {
        match self
            .formats
            .iter_mut()
            .find(|format| format.extension().eq_ignore_ascii_case(factory.extension()))
        {
            Some(slot) => *slot = factory,
            None => self.formats.push(factory),
        }
    }

    pub fn with_format(mut self, factory: Arc<dyn FormatFactory>) -> Self {
        self.register(factory);
        self
    }

    /// Factory registered for `extension`
    pub fn get(&self, extension: &str) -> Option<&Arc<dyn FormatFactory>> {
        let extension = extension.trim().trim_start_matches('.');
        self.formats
            .iter()
            .find(|format| format.extension().eq_ignore_ascii_case(extension))
    }

    /// Format identifier for `extension`, if one is registered
    pub fn resolve(&self, extension: &str) -> Option<ExportFormat> {
        self.get(extension).map(|factory| {
            ExportFormat::from_extension(factory.extension())
                .unwrap_or(ExportFormat::Custom(factory.extension()))
        })
    }

    /// Factory producing `format`
    pub fn factory(&self, format: ExportFormat) -> Result<&Arc<dyn FormatFactory>, OutputError> {
        self.get(format.extension())
            .ok_or_else(|| OutputError::UnsupportedFormat(format.to_string()))
    }

    /// Registered formats, built-ins first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FormatFactory>> {
        self.formats.iter()
    }
}

/// Helper function to create a buffered file writer
pub(crate) async fn create_writer(path: &Path) -> Result<BufWriter<File>, OutputError> {
    let file = File::create(path)
        .await
        .map_err(|e| OutputError::CreateFailed(format!("{}: {}", path.display(), e)))?;
    Ok(BufWriter::with_capacity(1024 * 1024, file))
}

/// Size of a finished file on disk
pub(crate) async fn file_size(path: &Path) -> Result<u64, OutputError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| OutputError::WriteFailed(format!("Failed to get file metadata: {}", e)))?;
    Ok(metadata.len())
}
