//! Configuration management for pieces-exporter
//!
//! Configuration comes from a TOML file, then command-line arguments
//! override individual export options. Every section and key is optional;
//! missing values fall back to the defaults below.
//!
//! ```toml
//! [connection]
//! uri = "mongodb://localhost:27017"
//! database = "apostrophe"
//!
//! [export]
//! batch_size = 100
//! expiration = 3600000
//! format = "csv"
//! mode = "draft"
//!
//! [storage]
//! root = "./public/uploads"
//! base_url = "/uploads"
//!
//! [[types]]
//! name = "article"
//! fields = [{ name = "title", type = "string" }]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::export::{DEFAULT_BATCH_SIZE, DEFAULT_EXPIRATION, ExportOptions};
use crate::output::ExportFormat;
use crate::schema::Schema;
use crate::source::{ArchivedFilter, DocMode};
use crate::storage::LocalStorage;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Default export options
    #[serde(default)]
    pub export: ExportConfig,

    /// Where finished exports are stored
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Exportable record types
    #[serde(default)]
    pub types: Vec<Schema>,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// MongoDB connection URI
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database holding the records
    #[serde(default = "default_database")]
    pub database: String,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Maximum pool size
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

/// Default export options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Records per page
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Milliseconds until an uploaded export is deleted
    #[serde(default = "default_expiration")]
    pub expiration: u64,

    /// Output format extension
    #[serde(default = "default_format")]
    pub format: String,

    /// Archive side: yes, no or both
    #[serde(default)]
    pub archived: String,

    /// Draft or live copies of localized records
    #[serde(default)]
    pub mode: String,

    /// Locale to export; every locale when unset
    #[serde(default)]
    pub locale: Option<String>,

    /// Fields left out of every export
    #[serde(default)]
    pub omit_fields: Vec<String>,

    /// Draw a spinner while exporting
    #[serde(default)]
    pub progress_bar: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory uploaded files are copied into
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// URL prefix the root directory is served under
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Staging directory; the OS temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "apostrophe".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_pool_size() -> u32 {
    10
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_expiration() -> u64 {
    DEFAULT_EXPIRATION.as_millis() as u64
}

fn default_format() -> String {
    ExportFormat::Csv.extension().to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./public/uploads")
}

fn default_base_url() -> String {
    "/uploads".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            timeout: default_timeout(),
            max_pool_size: default_max_pool_size(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            expiration: default_expiration(),
            format: default_format(),
            archived: String::new(),
            mode: String::new(),
            locale: None,
            omit_fields: Vec::new(),
            progress_bar: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            base_url: default_base_url(),
            temp_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::InvalidFormat(format!("{}: {}", path.display(), e))
            }
        })?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration for a run
    ///
    /// An explicit path must exist. Without one, the default path is read
    /// when present and the built-in defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pieces-exporter")
            .join("config.toml")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.connection.uri.starts_with("mongodb://")
            && !self.connection.uri.starts_with("mongodb+srv://")
        {
            return Err(invalid("connection.uri", &self.connection.uri).into());
        }
        if self.connection.database.is_empty() {
            return Err(ConfigError::MissingField("connection.database".to_string()).into());
        }
        if self.export.batch_size == 0 {
            return Err(invalid("export.batch_size", "0").into());
        }
        if ExportFormat::from_extension(&self.export.format).is_none() {
            return Err(invalid("export.format", &self.export.format).into());
        }
        if self.export.archived.parse::<ArchivedFilter>().is_err() {
            return Err(invalid("export.archived", &self.export.archived).into());
        }
        if self.export.mode.parse::<DocMode>().is_err() {
            return Err(invalid("export.mode", &self.export.mode).into());
        }
        for (index, schema) in self.types.iter().enumerate() {
            if schema.name.is_empty() {
                return Err(ConfigError::MissingField(format!("types[{index}].name")).into());
            }
            if self.types[..index].iter().any(|other| other.name == schema.name) {
                return Err(invalid("types.name", &schema.name).into());
            }
        }
        Ok(())
    }

    /// Schema of a configured record type
    pub fn schema(&self, type_name: &str) -> std::result::Result<Arc<Schema>, ConfigError> {
        self.types
            .iter()
            .find(|schema| schema.name == type_name)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| ConfigError::UnknownType(type_name.to_string()))
    }

    /// Export options built from the `[export]` section
    pub fn export_options(&self) -> Result<ExportOptions> {
        let format = ExportFormat::from_extension(&self.export.format)
            .ok_or_else(|| invalid("export.format", &self.export.format))?;
        let archived = self.export.archived.parse::<ArchivedFilter>()?;
        let mode = self.export.mode.parse::<DocMode>()?;

        let options = ExportOptions::default()
            .with_format(format)
            .with_batch_size(self.export.batch_size)
            .with_expiration(Duration::from_millis(self.export.expiration))
            .with_archived(archived)
            .with_mode(mode)
            .with_omitted(self.export.omit_fields.iter().cloned());

        Ok(match &self.export.locale {
            Some(locale) => options.with_locale(locale.clone()),
            None => options,
        })
    }

    /// Local storage described by the `[storage]` section
    pub fn local_storage(&self) -> LocalStorage {
        let storage = LocalStorage::new(&self.storage.root, self.storage.base_url.clone());
        match &self.storage.temp_dir {
            Some(dir) => storage.with_temp_dir(dir),
            None => storage,
        }
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExporterError;
    use crate::schema::FieldType;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.uri, "mongodb://localhost:27017");
        assert_eq!(config.connection.database, "apostrophe");
        assert_eq!(config.export.batch_size, 100);
        assert_eq!(config.export.expiration, 3_600_000);
        assert_eq!(config.export.format, "csv");
        assert_eq!(config.storage.base_url, "/uploads");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_timeout() {
        let config = Config::default();
        assert_eq!(config.connection_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml(
            r#"
            [connection]
            uri = "mongodb://db.internal:27017"
            database = "site"

            [export]
            batch_size = 250
            expiration = 60000
            format = "xlsx"
            archived = "no"
            mode = "live"
            locale = "en"
            omit_fields = ["secret"]

            [storage]
            root = "/srv/uploads"
            base_url = "https://cdn.example.com/uploads"

            [logging]
            level = "debug"

            [[types]]
            name = "product"
            plural_label = "Products"
            fields = [
                { name = "title", type = "string" },
                { name = "body", type = "area", options = { export_plain_text = true } },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.database, "site");
        assert_eq!(config.connection.timeout, 30);
        assert_eq!(config.logging.level, LogLevel::Debug);

        let options = config.export_options().unwrap();
        assert_eq!(options.format, ExportFormat::Xlsx);
        assert_eq!(options.batch_size, 250);
        assert_eq!(options.expiration, Duration::from_secs(60));
        assert_eq!(options.archived, ArchivedFilter::Live);
        assert_eq!(options.mode, DocMode::Live);
        assert_eq!(options.locale.as_deref(), Some("en"));
        assert_eq!(options.omit_fields, vec!["secret".to_string()]);

        let schema = config.schema("product").unwrap();
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(schema.fields[1].field_type, FieldType::Area);
        assert!(schema.fields[1].options.export_plain_text);

        assert_eq!(
            config.local_storage().url_for("/exports/a.xlsx"),
            "https://cdn.example.com/uploads/exports/a.xlsx"
        );
    }

    #[test]
    fn test_unknown_type() {
        let config = Config::default();
        assert!(matches!(
            config.schema("article"),
            Err(ConfigError::UnknownType(name)) if name == "article"
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for text in [
            "[export]\nbatch_size = 0",
            "[export]\nformat = \"pdf\"",
            "[export]\narchived = \"sometimes\"",
            "[export]\nmode = \"staging\"",
            "[connection]\nuri = \"postgres://localhost\"",
            "[[types]]\nname = \"a\"\n[[types]]\nname = \"a\"",
        ] {
            let err = Config::from_toml(text).unwrap_err();
            assert!(
                matches!(err, ExporterError::Config(ConfigError::InvalidValue { .. })),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml("[export\nbatch_size = ").unwrap_err();
        assert!(matches!(err, ExporterError::Config(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ExporterError::Config(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[export]\nbatch_size = 7\n").unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.export.batch_size, 7);
    }
}
