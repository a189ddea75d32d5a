//! Command-line interface for pieces-exporter
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and argument overrides
//! - Translating export arguments into [`ExportOptions`]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use bson::Document;

use crate::config::{Config, LogLevel};
use crate::error::{QueryError, Result};
use crate::export::ExportOptions;
use crate::output::{ExportFormat, FormatRegistry};
use crate::source::{ArchivedFilter, DocMode};

/// Export document-store records to downloadable files
#[derive(Parser, Debug)]
#[command(
    name = "pieces-exporter",
    version,
    about = "Export records to CSV, TSV, JSON Lines or Excel",
    long_about = "Pages through every record of a configured type, writes them to a file in the
requested format, copies the file into the uploads directory and prints its URL.
The uploaded file is deleted again once its expiration has passed."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for pieces-exporter
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export every record of a type
    Export(ExportArgs),

    /// List the available output formats
    Formats,
}

/// Arguments of the `export` subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
    /// Record type to export, as named in the configuration
    #[arg(value_name = "TYPE")]
    pub type_name: String,

    /// Output format (csv, tsv, jsonl, xlsx)
    #[arg(short = 'f', long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Records fetched per page
    #[arg(short = 'b', long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Milliseconds until the uploaded file is deleted
    #[arg(short = 'e', long, value_name = "MS")]
    pub expiration: Option<u64>,

    /// Archived records to include (yes, no, both)
    #[arg(long, value_name = "WHICH")]
    pub archived: Option<String>,

    /// Copies of localized records to export (draft, live)
    #[arg(short = 'm', long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Locale to export, such as "en"; every locale when omitted
    #[arg(short = 'l', long, value_name = "LOCALE")]
    pub locale: Option<String>,

    /// Field to leave out; repeat for several
    #[arg(long = "omit", value_name = "FIELD")]
    pub omit: Vec<String>,

    /// Extra query predicates as a JSON object
    #[arg(long, value_name = "JSON")]
    pub filter: Option<String>,

    /// Draw a progress spinner
    #[arg(long)]
    pub progress: bool,

    /// Exit right after the upload; the uploaded file is then never deleted
    #[arg(
        long,
        long_help = "Exit right after the upload instead of waiting for the expiry.\n\
                     The expiry timer lives in this process, so the uploaded file is \
                     NOT deleted and must be removed by other means."
    )]
    pub no_expire_wait: bool,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Load configuration for already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_logging_args(&mut config, &args);
        Ok(Self { args, config })
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Export options from the configuration, overridden by `args`
    pub fn export_options(&self, args: &ExportArgs) -> Result<ExportOptions> {
        let mut options = self.config.export_options()?;

        if let Some(format) = &args.format {
            options.format = format.parse::<ExportFormat>()?;
        }
        if let Some(batch_size) = args.batch_size {
            options.batch_size = batch_size;
        }
        if let Some(expiration) = args.expiration {
            options.expiration = Duration::from_millis(expiration);
        }
        if let Some(archived) = &args.archived {
            options.archived = archived.parse::<ArchivedFilter>()?;
        }
        if let Some(mode) = &args.mode {
            options.mode = mode.parse::<DocMode>()?;
        }
        if let Some(locale) = &args.locale {
            options.locale = Some(locale.clone());
        }
        if let Some(filter) = &args.filter {
            options.filters = parse_filter(filter)?;
        }
        options.omit_fields.extend(args.omit.iter().cloned());
        options.requester = Some(requester());

        options.validate()?;
        Ok(options)
    }

    /// Whether to draw a spinner during `export`
    pub fn progress_enabled(&self, args: &ExportArgs) -> bool {
        (args.progress || self.config.export.progress_bar) && !self.args.quiet
    }

    /// Print the available formats
    pub fn show_formats(&self) {
        for format in FormatRegistry::default().iter() {
            let mode = if format.is_streaming() {
                "streamed"
            } else {
                "rendered at the end"
            };
            println!("{:<6} {} ({})", format.extension(), format.label(), mode);
        }
    }
}

/// Parse a JSON object of query predicates
fn parse_filter(json: &str) -> Result<Document> {
    serde_json::from_str::<Document>(json)
        .map_err(|e| QueryError::InvalidFilter(format!("{}: {}", json, e)).into())
}

/// Name of the local user, for the logs
fn requester() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "cli".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ExporterError, OutputError};
    use bson::doc;

    fn interface(argv: &[&str]) -> (CliInterface, ExportArgs) {
        let args = CliArgs::try_parse_from(argv).unwrap();
        let export = match &args.command {
            Commands::Export(export) => export.clone(),
            Commands::Formats => ExportArgs::default(),
        };
        let cli = CliInterface {
            args,
            config: Config::default(),
        };
        (cli, export)
    }

    #[test]
    fn test_export_args_parsing() {
        let args = CliArgs::try_parse_from([
            "pieces-exporter",
            "export",
            "article",
            "--format",
            "xlsx",
            "--omit",
            "secret",
            "--omit",
            "notes",
            "--no-expire-wait",
        ])
        .unwrap();

        let Commands::Export(export) = args.command else {
            panic!("expected export");
        };
        assert_eq!(export.type_name, "article");
        assert_eq!(export.format.as_deref(), Some("xlsx"));
        assert_eq!(export.omit, vec!["secret", "notes"]);
        assert!(export.no_expire_wait);
    }

    #[test]
    fn test_export_requires_type() {
        assert!(CliArgs::try_parse_from(["pieces-exporter", "export"]).is_err());
    }

    #[test]
    fn test_formats_subcommand() {
        let args = CliArgs::try_parse_from(["pieces-exporter", "formats", "-v"]).unwrap();
        assert!(matches!(args.command, Commands::Formats));
        assert!(args.verbose);
    }

    #[test]
    fn test_arguments_override_config() {
        let (cli, export) = interface(&[
            "pieces-exporter",
            "export",
            "article",
            "-f",
            "tsv",
            "-b",
            "25",
            "-e",
            "1000",
            "--archived",
            "yes",
            "--mode",
            "live",
            "-l",
            "en",
            "--filter",
            r#"{"type": "article", "published": true}"#,
        ]);
        let options = cli.export_options(&export).unwrap();

        assert_eq!(options.format, ExportFormat::Tsv);
        assert_eq!(options.batch_size, 25);
        assert_eq!(options.expiration, Duration::from_secs(1));
        assert_eq!(options.archived, ArchivedFilter::Only);
        assert_eq!(options.mode, DocMode::Live);
        assert_eq!(options.locale.as_deref(), Some("en"));
        assert_eq!(options.filters, doc! { "type": "article", "published": true });
        assert!(options.requester.is_some());
    }

    #[test]
    fn test_defaults_come_from_config() {
        let (cli, export) = interface(&["pieces-exporter", "export", "article"]);
        let options = cli.export_options(&export).unwrap();
        assert_eq!(options.format, ExportFormat::Csv);
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.expiration, Duration::from_millis(3_600_000));
        assert_eq!(options.mode, DocMode::Draft);
        assert_eq!(options.locale, None);
    }

    #[test]
    fn test_invalid_arguments_rejected() {
        let (cli, export) = interface(&["pieces-exporter", "export", "a", "-f", "pdf"]);
        assert!(matches!(
            cli.export_options(&export),
            Err(ExporterError::Output(OutputError::UnsupportedFormat(_)))
        ));

        let (cli, export) = interface(&["pieces-exporter", "export", "a", "-b", "0"]);
        assert!(matches!(
            cli.export_options(&export),
            Err(ExporterError::Config(ConfigError::InvalidValue { .. }))
        ));

        let (cli, export) = interface(&["pieces-exporter", "export", "a", "--mode", "stage"]);
        assert!(matches!(
            cli.export_options(&export),
            Err(ExporterError::Query(QueryError::InvalidFilter(_)))
        ));

        let (cli, export) = interface(&["pieces-exporter", "export", "a", "--filter", "[1"]);
        assert!(matches!(
            cli.export_options(&export),
            Err(ExporterError::Query(QueryError::InvalidFilter(_)))
        ));
    }

    #[test]
    fn test_no_expire_wait_says_file_is_kept() {
        use clap::CommandFactory;

        let command = CliArgs::command();
        let export = command.find_subcommand("export").unwrap();
        let flag = export
            .get_arguments()
            .find(|arg| arg.get_id() == "no_expire_wait")
            .unwrap();
        assert!(flag.get_help().unwrap().to_string().contains("never deleted"));
        assert!(flag.get_long_help().unwrap().to_string().contains("NOT deleted"));
    }

    #[test]
    fn test_verbosity_flags() {
        let args = CliArgs::try_parse_from(["pieces-exporter", "--vv", "formats"]).unwrap();
        let mut config = Config::default();
        CliInterface::apply_logging_args(&mut config, &args);
        assert_eq!(config.logging.level, LogLevel::Trace);
    }
}
