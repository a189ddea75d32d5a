//! JSON Lines writer for export operations
//!
//! Writes one JSON object per record, one record per line. Keys follow the
//! layout's column order, followed by any field a hook added.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::OutputError;
use crate::normalize::NormalizedRecord;

use super::{ExportFormat, OutputAdapter, OutputLayout, OutputSummary, create_writer, file_size};

/// Writer for JSON Lines format
pub struct JsonLinesWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    columns: Vec<String>,
    written: u64,
}

impl JsonLinesWriter {
    /// Create a new JSON Lines writer at `path`
    pub async fn open(path: &Path, layout: OutputLayout) -> Result<Self, OutputError> {
        let writer = create_writer(path).await?;

        debug!("Created JSON Lines writer for: {}", path.display());

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            columns: layout.columns,
            written: 0,
        })
    }

    fn encode(&self, record: &NormalizedRecord) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(&JsonRecord {
            columns: &self.columns,
            record,
        })?;
        line.push(b'\n');
        Ok(line)
    }
}

/// A record as one JSON object, keys in output order
struct JsonRecord<'a> {
    columns: &'a [String],
    record: &'a NormalizedRecord,
}

impl Serialize for JsonRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.record.entries(self.columns))
    }
}

#[async_trait]
impl OutputAdapter for JsonLinesWriter {
    async fn write(&mut self, record: &NormalizedRecord) -> Result<(), OutputError> {
        let line = self.encode(record).map_err(|e| OutputError::Serialize {
            record_id: record.id().to_string(),
            message: e.to_string(),
        })?;

        self.writer
            .write_all(&line)
            .await
            .map_err(|e| OutputError::WriteFailed(e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    async fn finalize(mut self: Box<Self>) -> Result<OutputSummary, OutputError> {
        self.writer
            .flush()
            .await
            .map_err(|e| OutputError::WriteFailed(format!("Failed to flush file: {}", e)))?;
        self.writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| OutputError::WriteFailed(format!("Failed to sync file: {}", e)))?;

        debug!("Finalized JSON Lines file: {} ({} records)", self.path.display(), self.written);

        Ok(OutputSummary {
            format: ExportFormat::JsonLines,
            path: self.path.clone(),
            records_written: self.written,
            bytes_written: file_size(&self.path).await?,
        })
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::JsonLines
    }
}
