//! Error handling module for export operations.
//!
//! Errors fall into five groups that decide how far they travel:
//! - per-record faults ([`RecordError`], serialization [`OutputError`]s) are
//!   counted and the export continues
//! - page fetch faults ([`QueryError`]) abort the job
//! - adapter faults ([`OutputError`]) abort the job
//! - upload faults ([`StorageError`]) abort the job
//! - cleanup faults are logged and never surface here
//!
//! # Example
//!
//! ```rust,no_run
//! use pieces_exporter::error::{ExporterError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(ExporterError::Generic("nothing to export".to_string()))
//! }
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ExporterError, OutputError, QueryError, RecordError, Result, StorageError,
};
