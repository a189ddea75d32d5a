//! Batch cursor walker
//!
//! Pages through a record source in ascending `_id` order, pushing every
//! record through the normalizer into an output adapter, until the source
//! returns an empty page.

use bson::{Bson, Document};
use tracing::{debug, info};

use crate::error::Result;
use crate::normalize::{BsonConverter, FieldNormalizer, PlainTextConverter};
use crate::output::{OutputAdapter, OutputSummary};
use crate::reporting::{RecordFailure, Reporter};
use crate::schema::ID_FIELD;
use crate::source::{ArchivedFilter, CursorPosition, ModeFilter, PageRequest, RecordSource};

/// Outcome of a complete walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkSummary {
    /// What the adapter produced
    pub output: OutputSummary,
    /// Records reported as exported
    pub succeeded: u64,
    /// Records reported as skipped
    pub failed: u64,
    /// Pages requested, the final empty one included
    pub pages: u64,
}

/// Walks a record source page by page
pub struct BatchWalker<'a> {
    source: &'a dyn RecordSource,
    normalizer: &'a FieldNormalizer,
    reporter: &'a dyn Reporter,
    batch_size: usize,
    archived: ArchivedFilter,
    mode: ModeFilter,
    filters: Document,
}

impl<'a> BatchWalker<'a> {
    pub fn new(
        source: &'a dyn RecordSource,
        normalizer: &'a FieldNormalizer,
        reporter: &'a dyn Reporter,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            normalizer,
            reporter,
            batch_size: batch_size.max(1),
            archived: ArchivedFilter::default(),
            mode: ModeFilter::default(),
            filters: Document::new(),
        }
    }

    /// Restrict the walk to one side of the archive
    pub fn with_archived(mut self, archived: ArchivedFilter) -> Self {
        self.archived = archived;
        self
    }

    /// Choose draft or published copies, optionally of one locale
    pub fn with_mode(mut self, mode: ModeFilter) -> Self {
        self.mode = mode;
        self
    }

    /// Forward caller predicates to every page request
    pub fn with_filters(mut self, filters: Document) -> Self {
        self.filters = filters;
        self
    }

    /// Walk the source into `adapter` and finalize it
    ///
    /// Per-record failures are reported and skipped. A failed fetch, a
    /// broken adapter, or a record without a usable `_id` ends the walk with
    /// an error; the adapter is dropped unfinished in that case.
    pub async fn run(&self, mut adapter: Box<dyn OutputAdapter>) -> Result<WalkSummary> {
        let mut request = PageRequest {
            after: CursorPosition::start(),
            limit: self.batch_size,
            archived: self.archived,
            mode: self.mode.clone(),
            filters: self.filters.clone(),
        };
        let mut succeeded = 0u64;
        let mut failed = 0u64;
        let mut pages = 0u64;

        info!(
            format = %adapter.format(),
            batch_size = self.batch_size,
            "Starting export walk"
        );

        loop {
            pages += 1;
            debug!(page = pages, after = %request.after, "Fetching page");

            let page = self.source.fetch_page(&request).await?;
            if page.is_empty() {
                debug!("No more records available");
                break;
            }

            for raw in &page {
                match self.export_record(adapter.as_mut(), raw).await? {
                    Ok(()) => succeeded += 1,
                    Err(failure) => {
                        self.reporter.record_failure(&failure);
                        failed += 1;
                    }
                }
            }

            // Advance past the whole page even when some records failed.
            request.after.advance(&page)?;

            if pages % 10 == 0 {
                info!(
                    "Progress: {} records exported, {} skipped ({} pages)",
                    succeeded, failed, pages
                );
            }
        }

        debug!("Finalizing output file");
        let output = adapter.finalize().await?;

        info!(
            "Walk completed: {} records exported, {} skipped, {} pages",
            succeeded, failed, pages
        );

        Ok(WalkSummary {
            output,
            succeeded,
            failed,
            pages,
        })
    }

    /// Normalize and write one record
    ///
    /// The outer result carries fatal adapter faults; the inner one carries
    /// the failure of this record alone.
    async fn export_record(
        &self,
        adapter: &mut dyn OutputAdapter,
        raw: &Document,
    ) -> Result<std::result::Result<(), RecordFailure>> {
        let normalized = match self.normalizer.normalize(raw) {
            Ok(normalized) => normalized,
            Err(e) => return Ok(Err(RecordFailure::new(record_id(raw), e.to_string()))),
        };

        match adapter.write(&normalized).await {
            Ok(()) => {
                self.reporter.record_success(normalized.id());
                Ok(Ok(()))
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => Ok(Err(RecordFailure::new(
                Some(normalized.id().to_string()),
                e.to_string(),
            ))),
        }
    }
}

fn record_id(raw: &Document) -> Option<String> {
    match raw.get(ID_FIELD) {
        None | Some(Bson::Null) => None,
        Some(id) => Some(PlainTextConverter::new().convert(id)),
    }
}
