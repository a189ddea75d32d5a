//! pieces-exporter library
//!
//! Streams the records of one document type out of MongoDB into a
//! downloadable CSV, TSV, JSON Lines or Excel file without holding the whole
//! result set in memory, tolerating bad records along the way.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: MongoDB connection management
//! - `error`: Error types and handling
//! - `export`: Export jobs, the batch walker and the orchestrator
//! - `normalize`: Flattening raw records into output-ready values
//! - `output`: Streaming and buffering output adapters
//! - `reporting`: Per-record progress and result reporting
//! - `schema`: Record type and field definitions
//! - `source`: Paginated record sources
//! - `storage`: Where finished exports are published
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pieces_exporter::{
//!     config::Config,
//!     connection::ConnectionManager,
//!     export::{ExportJob, Exporter},
//!     reporting::ProgressReporter,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let schema = config.schema("article")?;
//!
//!     let mut manager = ConnectionManager::new(config.connection.clone());
//!     manager.connect().await?;
//!
//!     let exporter = Exporter::new(
//!         Arc::new(manager.record_source(&schema)?),
//!         Arc::new(config.local_storage()),
//!         Arc::new(ProgressReporter::default()),
//!     );
//!     let job = ExportJob::new(schema, config.export_options()?)?;
//!     let result = exporter.run(&job).await?;
//!     println!("Export ready at {}", result.url);
//!
//!     manager.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod normalize;
pub mod output;
pub mod reporting;
pub mod schema;
pub mod source;
pub mod storage;

pub use error::{ExporterError, Result};
