//! pieces-exporter
//!
//! Exports every record of a configured type to a CSV, TSV, JSON Lines or
//! Excel file, publishes it under the uploads directory and deletes it again
//! once it expires.
//!
//! # Usage
//!
//! ```bash
//! pieces-exporter export article --format xlsx --omit secret
//! pieces-exporter formats
//! ```

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pieces_exporter::cli::{CliInterface, Commands, ExportArgs};
use pieces_exporter::connection::ConnectionManager;
use pieces_exporter::error::Result;
use pieces_exporter::export::{ExportJob, ExportResult, Exporter};
use pieces_exporter::reporting::ProgressReporter;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    match &cli.args().command {
        Commands::Formats => {
            cli.show_formats();
            Ok(())
        }
        Commands::Export(args) => run_export(&cli, args).await,
    }
}

/// Run one export and wait for its expiry unless told otherwise
async fn run_export(cli: &CliInterface, args: &ExportArgs) -> Result<()> {
    let schema = cli.config().schema(&args.type_name)?;
    let options = cli.export_options(args)?;
    let job = ExportJob::new(schema.clone(), options)?;

    let mut conn_manager = ConnectionManager::new(cli.config().connection.clone());
    conn_manager.connect().await?;

    let source = Arc::new(conn_manager.record_source(&schema)?);
    let storage = Arc::new(cli.config().local_storage());
    let reporter = Arc::new(ProgressReporter::new(cli.progress_enabled(args)));

    let exporter = Exporter::new(source, storage, reporter.clone());
    let outcome = exporter.run_with_timer(&job).await;
    reporter.finish();
    conn_manager.disconnect().await?;

    let (result, timer) = outcome?;
    print_result(&result, &reporter);

    if args.no_expire_wait {
        warn!("Not waiting for expiry; {} will not be deleted", timer.remote_key());
        println!("Not waiting for expiry: the uploaded file will not be deleted");
    } else {
        info!("Waiting for {} to expire", timer.remote_key());
        println!("Keeping the file until {}", result.expires_at.to_rfc3339());
        timer.wait().await;
    }

    Ok(())
}

/// Print the result URL, counts and any skipped records
fn print_result(result: &ExportResult, reporter: &ProgressReporter) {
    println!("{}", result.url);
    println!(
        "{} records exported, {} skipped ({} bytes, {})",
        result.succeeded, result.failed, result.bytes_written, result.format
    );
    for failure in reporter.failures() {
        println!("  skipped {}", failure);
    }
}

/// Initialize logging system based on verbosity level
///
/// `RUST_LOG` takes precedence over the configured level.
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
