//! Progress reporting for export jobs
//!
//! The pipeline reports one outcome per record and, once the file is
//! uploaded, the final result. Reporters are write-only observers: nothing
//! they do feeds back into the export.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::export::ExportResult;

/// One record that could not be exported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Identifier of the record, when it had one
    pub record_id: Option<String>,
    /// What went wrong
    pub reason: String,
}

impl RecordFailure {
    pub fn new(record_id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            record_id,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.record_id {
            Some(id) => write!(f, "{}: {}", id, self.reason),
            None => write!(f, "<no id>: {}", self.reason),
        }
    }
}

/// Observer of export progress
pub trait Reporter: Send + Sync {
    /// A record was normalized and written
    fn record_success(&self, record_id: &str);

    /// A record was skipped
    fn record_failure(&self, failure: &RecordFailure);

    /// The export finished and its file is available
    ///
    /// Called once per job, after the upload.
    fn set_result(&self, result: &ExportResult);
}

/// Reporter that counts outcomes, keeps failure details and the result
///
/// Optionally draws a spinner on the terminal while records flow through.
pub struct ProgressReporter {
    succeeded: AtomicU64,
    failed: AtomicU64,
    failures: Mutex<Vec<RecordFailure>>,
    result: Mutex<Option<ExportResult>>,
    start_time: Instant,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    /// Create a reporter
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to draw a spinner
    pub fn new(enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} {pos} records {msg}")
            {
                bar.set_style(style);
            }
            bar
        });

        Self {
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            failures: Mutex::new(Vec::new()),
            result: Mutex::new(None),
            start_time: Instant::now(),
            bar,
        }
    }

    /// Records written so far
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Records skipped so far
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Every failure reported, in order
    pub fn failures(&self) -> Vec<RecordFailure> {
        self.failures
            .lock()
            .map(|failures| failures.clone())
            .unwrap_or_default()
    }

    /// Final result, once the job has published one
    pub fn result(&self) -> Option<ExportResult> {
        self.result.lock().ok().and_then(|result| result.clone())
    }

    /// Clear the spinner
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }

    fn tick(&self) {
        let Some(ref bar) = self.bar else {
            return;
        };
        let processed = self.succeeded() + self.failed();
        bar.set_position(processed);

        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let speed = processed as f64 / elapsed;
            bar.set_message(format!("({:.0} records/sec, {} failed)", speed, self.failed()));
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Reporter for ProgressReporter {
    fn record_success(&self, _record_id: &str) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    fn record_failure(&self, failure: &RecordFailure) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        warn!(record_id = ?failure.record_id, "Record skipped: {}", failure.reason);
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(failure.clone());
        }
        self.tick();
    }

    fn set_result(&self, result: &ExportResult) {
        self.finish();
        if let Ok(mut slot) = self.result.lock() {
            *slot = Some(result.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ExportFormat;

    #[test]
    fn test_counts_outcomes() {
        let reporter = ProgressReporter::new(false);
        reporter.record_success("a");
        reporter.record_success("b");
        reporter.record_failure(&RecordFailure::new(Some("c".into()), "bad relationship"));

        assert_eq!(reporter.succeeded(), 2);
        assert_eq!(reporter.failed(), 1);
        assert_eq!(
            reporter.failures(),
            vec![RecordFailure::new(Some("c".into()), "bad relationship")]
        );
    }

    #[test]
    fn test_stores_result() {
        let reporter = ProgressReporter::default();
        assert!(reporter.result().is_none());

        let result = ExportResult {
            url: "/uploads/exports/x.csv".to_string(),
            download_path: "/exports/x.csv".to_string(),
            format: ExportFormat::Csv,
            records_written: 3,
            bytes_written: 42,
            succeeded: 3,
            failed: 0,
            expires_at: chrono::Utc::now(),
        };
        reporter.set_result(&result);
        assert_eq!(reporter.result(), Some(result));
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(
            RecordFailure::new(Some("p1".into()), "boom").to_string(),
            "p1: boom"
        );
        assert_eq!(RecordFailure::new(None, "no _id").to_string(), "<no id>: no _id");
    }
}
