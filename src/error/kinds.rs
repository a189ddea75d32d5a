use std::{fmt, io};

/// Crate-wide `Result` type using [`ExporterError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Top-level error type for export operations.
///
/// A job either completes with a result URL or fails with exactly one of
/// these. Per-record faults ([`RecordError`]) are counted by the walker and
/// only reach this type when a caller normalizes records directly.
#[derive(Debug)]
pub enum ExporterError {
    /// Data source faults while fetching a page.
    Query(QueryError),

    /// Output adapter faults (stream I/O, render).
    Output(OutputError),

    /// Storage service faults (upload, remove).
    Storage(StorageError),

    /// Configuration errors.
    Config(ConfigError),

    /// A single record could not be exported.
    Record(RecordError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Data source errors.
#[derive(Debug)]
pub enum QueryError {
    /// The store rejected or failed the page query.
    FetchFailed(String),

    /// A record came back without a usable `_id` cursor key.
    MissingKey(String),

    /// The caller-supplied filters could not be applied.
    InvalidFilter(String),
}

/// Output adapter errors.
#[derive(Debug)]
pub enum OutputError {
    /// Unknown output format identifier.
    UnsupportedFormat(String),

    /// The destination file could not be created.
    CreateFailed(String),

    /// Writing to the destination stream failed.
    WriteFailed(String),

    /// One record could not be serialized; the stream itself is intact.
    Serialize { record_id: String, message: String },

    /// Rendering a buffered document failed.
    RenderFailed(String),
}

/// Storage service errors.
#[derive(Debug)]
pub enum StorageError {
    /// Copying the local file into storage failed.
    UploadFailed { key: String, message: String },

    /// Removing a stored artifact failed.
    RemoveFailed { key: String, message: String },

    /// The remote key is not a valid relative path.
    InvalidKey(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// No record type with that name is configured.
    UnknownType(String),
}

/// Per-record normalization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A field held a value of a shape its type cannot render.
    InvalidValue { field: String, message: String },

    /// The post-normalization hook rejected the record.
    Hook(String),
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExporterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterError::Query(e) => write!(f, "Query error: {e}"),
            ExporterError::Output(e) => write!(f, "Output error: {e}"),
            ExporterError::Storage(e) => write!(f, "Storage error: {e}"),
            ExporterError::Config(e) => write!(f, "Configuration error: {e}"),
            ExporterError::Record(e) => write!(f, "Record error: {e}"),
            ExporterError::Io(e) => write!(f, "I/O error: {e}"),
            ExporterError::MongoDb(e) => write!(f, "MongoDB error: {e}"),
            ExporterError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::FetchFailed(msg) => write!(f, "Failed to fetch page: {msg}"),
            QueryError::MissingKey(msg) => write!(f, "Record without cursor key: {msg}"),
            QueryError::InvalidFilter(msg) => write!(f, "Invalid filter: {msg}"),
        }
    }
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::UnsupportedFormat(ext) => write!(f, "Unsupported export format: {ext}"),
            OutputError::CreateFailed(msg) => write!(f, "Failed to create file: {msg}"),
            OutputError::WriteFailed(msg) => write!(f, "Failed to write to file: {msg}"),
            OutputError::Serialize { record_id, message } => {
                write!(f, "Failed to serialize record {record_id}: {message}")
            }
            OutputError::RenderFailed(msg) => write!(f, "Failed to render document: {msg}"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::UploadFailed { key, message } => {
                write!(f, "Failed to upload {key}: {message}")
            }
            StorageError::RemoveFailed { key, message } => {
                write!(f, "Failed to remove {key}: {message}")
            }
            StorageError::InvalidKey(key) => write!(f, "Invalid storage key: {key}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::UnknownType(name) => write!(f, "Unknown record type: {name}"),
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::InvalidValue { field, message } => {
                write!(f, "Invalid value in field '{field}': {message}")
            }
            RecordError::Hook(msg) => write!(f, "Export hook failed: {msg}"),
        }
    }
}

impl std::error::Error for ExporterError {}
impl std::error::Error for QueryError {}
impl std::error::Error for OutputError {}
impl std::error::Error for StorageError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for RecordError {}

impl OutputError {
    /// Whether the fault leaves the destination unusable.
    ///
    /// Serialization faults are scoped to one record; everything else means
    /// the file on disk can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, OutputError::Serialize { .. })
    }
}

/* ========================= Conversions to ExporterError ========================= */

impl From<io::Error> for ExporterError {
    fn from(err: io::Error) -> Self {
        ExporterError::Io(err)
    }
}

impl From<mongodb::error::Error> for ExporterError {
    fn from(err: mongodb::error::Error) -> Self {
        ExporterError::MongoDb(err)
    }
}

impl From<QueryError> for ExporterError {
    fn from(err: QueryError) -> Self {
        ExporterError::Query(err)
    }
}

impl From<OutputError> for ExporterError {
    fn from(err: OutputError) -> Self {
        ExporterError::Output(err)
    }
}

impl From<StorageError> for ExporterError {
    fn from(err: StorageError) -> Self {
        ExporterError::Storage(err)
    }
}

impl From<ConfigError> for ExporterError {
    fn from(err: ConfigError) -> Self {
        ExporterError::Config(err)
    }
}

impl From<RecordError> for ExporterError {
    fn from(err: RecordError) -> Self {
        ExporterError::Record(err)
    }
}

impl From<String> for ExporterError {
    fn from(msg: String) -> Self {
        ExporterError::Generic(msg)
    }
}

impl From<&str> for ExporterError {
    fn from(msg: &str) -> Self {
        ExporterError::Generic(msg.to_string())
    }
}

impl From<mongodb::error::Error> for QueryError {
    fn from(err: mongodb::error::Error) -> Self {
        QueryError::FetchFailed(err.to_string())
    }
}
