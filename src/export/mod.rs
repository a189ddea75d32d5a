//! Export pipeline
//!
//! An [`Exporter`] runs an [`ExportJob`]: it opens the output adapter for the
//! job's format on a staging file, lets a [`BatchWalker`] page the record
//! source into it, uploads the finished file, reports the [`ExportResult`]
//! and arms an [`ExpiryTimer`] that deletes the upload later.

pub mod job;
pub mod orchestrator;
pub mod walker;


pub use job::{
    DEFAULT_BATCH_SIZE, DEFAULT_EXPIRATION, EXPORTS_PREFIX, ExportJob, ExportOptions, ExportResult,
};
pub use orchestrator::{ExpiryTimer, Exporter, TempFile};
pub use walker::{BatchWalker, WalkSummary};
