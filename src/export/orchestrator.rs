//! Export orchestrator
//!
//! Owns the lifecycle of one export: staging file, walk, upload, result,
//! expiry. The staging file is removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::normalize::{BeforeExport, ContentResolver, DefaultContentResolver, FieldNormalizer};
use crate::output::{FormatFactory, FormatRegistry, OutputLayout};
use crate::reporting::Reporter;
use crate::source::RecordSource;
use crate::storage::Storage;

use super::job::{ExportJob, ExportResult};
use super::walker::BatchWalker;

/// Staging file removed when dropped, unless removed explicitly first
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    removed: bool,
}

impl TempFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file, logging any fault
    pub async fn remove(mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("Removed staging file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staging file {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staging file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staging file {}: {}", self.path.display(), e),
        }
    }
}

/// Pending deletion of an uploaded export
///
/// Dropping the timer detaches it; the deletion still happens.
#[derive(Debug)]
pub struct ExpiryTimer {
    remote_key: String,
    handle: JoinHandle<()>,
}

impl ExpiryTimer {
    /// Sleep for `after`, then remove `remote_key` from `storage` once
    pub fn schedule(storage: Arc<dyn Storage>, remote_key: String, after: Duration) -> Self {
        let key = remote_key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            match storage.remove(&key).await {
                Ok(()) => info!("Expired export {} removed", key),
                Err(e) => warn!("Failed to remove expired export {}: {}", key, e),
            }
        });

        Self { remote_key, handle }
    }

    pub fn remote_key(&self) -> &str {
        &self.remote_key
    }

    /// Wait until the deletion has run
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            warn!("Expiry task for {} ended abnormally: {}", self.remote_key, e);
        }
    }
}

/// Runs export jobs against one source, storage and reporter
pub struct Exporter {
    source: Arc<dyn RecordSource>,
    storage: Arc<dyn Storage>,
    reporter: Arc<dyn Reporter>,
    resolver: Option<Arc<dyn ContentResolver>>,
    hook: Option<BeforeExport>,
    formats: FormatRegistry,
}

impl Exporter {
    pub fn new(
        source: Arc<dyn RecordSource>,
        storage: Arc<dyn Storage>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            source,
            storage,
            reporter,
            resolver: None,
            hook: None,
            formats: FormatRegistry::default(),
        }
    }

    /// Resolve attachments and areas with `resolver` instead of the default
    pub fn with_resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Run `hook` on every normalized record
    pub fn with_hook(mut self, hook: BeforeExport) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Offer the formats of `formats` instead of the built-in set
    pub fn with_formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = formats;
        self
    }

    /// Add one output format, replacing any with the same extension
    pub fn register_format(mut self, factory: Arc<dyn FormatFactory>) -> Self {
        self.formats.register(factory);
        self
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    /// Run a job to completion
    ///
    /// The expiry timer is detached; use [`Exporter::run_with_timer`] to
    /// keep a handle on it.
    pub async fn run(&self, job: &ExportJob) -> Result<ExportResult> {
        let (result, _timer) = self.run_with_timer(job).await?;
        Ok(result)
    }

    /// Run a job to completion and return the armed expiry timer
    pub async fn run_with_timer(&self, job: &ExportJob) -> Result<(ExportResult, ExpiryTimer)> {
        let options = job.options();
        info!(
            job_id = %job.id(),
            record_type = %job.schema().name,
            format = %options.format,
            mode = %options.mode,
            requester = options.requester.as_deref().unwrap_or("-"),
            "Starting export"
        );

        let temp = TempFile::new(job.temp_path(self.storage.temp_dir()));

        let outcome = self.export_and_upload(job, temp.path()).await;
        temp.remove().await;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(job_id = %job.id(), "Export failed: {}", e);
                return Err(e);
            }
        };

        let timer = ExpiryTimer::schedule(
            Arc::clone(&self.storage),
            result.download_path.clone(),
            options.expiration,
        );

        info!(
            job_id = %job.id(),
            "Export completed: {} ({} records, {} skipped, {} bytes)",
            result.url, result.succeeded, result.failed, result.bytes_written
        );

        Ok((result, timer))
    }

    /// Produce the file at `temp_path`, upload it and publish the result
    async fn export_and_upload(&self, job: &ExportJob, temp_path: &Path) -> Result<ExportResult> {
        let options = job.options();
        let factory = self.formats.factory(options.format)?;
        let normalizer = self.normalizer(job);

        // Buffered formats lay out the schema fields alone
        let columns = if factory.is_streaming() {
            normalizer.columns()
        } else {
            normalizer.field_columns()
        };
        let layout = OutputLayout::new(columns, job.schema().sheet_name());

        let adapter = factory.open(temp_path, layout).await?;
        let walk = BatchWalker::new(
            self.source.as_ref(),
            &normalizer,
            self.reporter.as_ref(),
            options.batch_size,
        )
        .with_archived(options.archived)
        .with_mode(options.mode_filter())
        .with_filters(options.filters.clone())
        .run(adapter)
        .await?;

        let download_path = job.download_path();
        let url = self.storage.copy_in(temp_path, &download_path).await?;
        debug!("Uploaded {} to {}", temp_path.display(), url);

        let expires_at = chrono::Duration::from_std(options.expiration)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let result = ExportResult {
            url,
            download_path,
            format: walk.output.format,
            records_written: walk.output.records_written,
            bytes_written: walk.output.bytes_written,
            succeeded: walk.succeeded,
            failed: walk.failed,
            expires_at,
        };
        self.reporter.set_result(&result);

        Ok(result)
    }

    fn normalizer(&self, job: &ExportJob) -> FieldNormalizer {
        let resolver = self.resolver.clone().unwrap_or_else(|| {
            Arc::new(DefaultContentResolver::new(self.storage.base_url())) as Arc<dyn ContentResolver>
        });
        let normalizer = FieldNormalizer::new(Arc::clone(job.schema()), job.options().omit_fields.clone())
            .with_resolver(resolver);

        match &self.hook {
            Some(hook) => normalizer.with_hook(Arc::clone(hook)),
            None => normalizer,
        }
    }
}
