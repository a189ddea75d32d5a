//! Delimited text writer (CSV, TSV)
//!
//! Streams one row per record straight to the destination. The header row
//! goes out with the first record: the layout's columns plus any field the
//! first record carries beyond them (values a hook added). Every later row
//! uses that same column list. An empty export still gets its header.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::OutputError;
use crate::normalize::NormalizedRecord;

use super::{ExportFormat, OutputAdapter, OutputLayout, OutputSummary, create_writer, file_size};

/// Streaming writer for delimiter-separated rows
pub struct DelimitedWriter {
    /// Buffered file writer
    writer: BufWriter<File>,
    /// Path to the output file
    path: PathBuf,
    /// Column order for every row, fixed once the header is out
    layout: OutputLayout,
    /// Whether the header row has been written
    header_written: bool,
    /// Field separator byte
    delimiter: u8,
    /// Format reported in the summary
    format: ExportFormat,
    /// Number of records written
    written: u64,
}

impl DelimitedWriter {
    /// Create the file at `path`
    pub async fn open(
        path: &Path,
        layout: OutputLayout,
        delimiter: u8,
        format: ExportFormat,
    ) -> Result<Self, OutputError> {
        let writer = create_writer(path).await?;

        debug!("Created {} writer for: {}", format, path.display());
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            layout,
            header_written: false,
            delimiter,
            format,
            written: 0,
        })
    }

    async fn write_header(&mut self) -> Result<(), OutputError> {
        let header = self
            .encode_row(self.layout.columns.iter().map(String::as_str))
            .map_err(|message| OutputError::WriteFailed(format!("header: {message}")))?;
        self.append(&header).await?;
        self.header_written = true;
        Ok(())
    }

    /// Encode one row, quoting values as the delimiter requires
    fn encode_row<'a>(&self, values: impl Iterator<Item = &'a str>) -> Result<Vec<u8>, String> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(Vec::new());

        wtr.write_record(values).map_err(|e| e.to_string())?;
        wtr.into_inner().map_err(|e| e.to_string())
    }

    async fn append(&mut self, bytes: &[u8]) -> Result<(), OutputError> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| OutputError::WriteFailed(e.to_string()))
    }
}

#[async_trait]
impl OutputAdapter for DelimitedWriter {
    async fn write(&mut self, record: &NormalizedRecord) -> Result<(), OutputError> {
        if !self.header_written {
            self.layout.extend_with(record);
            self.write_header().await?;
        }

        let row = self
            .encode_row(record.row(&self.layout.columns))
            .map_err(|message| OutputError::Serialize {
                record_id: record.id().to_string(),
                message,
            })?;

        self.append(&row).await?;
        self.written += 1;
        Ok(())
    }

    async fn finalize(mut self: Box<Self>) -> Result<OutputSummary, OutputError> {
        if !self.header_written {
            self.write_header().await?;
        }

        self.writer
            .flush()
            .await
            .map_err(|e| OutputError::WriteFailed(format!("Failed to flush file: {}", e)))?;
        self.writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| OutputError::WriteFailed(format!("Failed to sync file: {}", e)))?;

        let bytes_written = file_size(&self.path).await?;
        debug!(
            "Finalized {} file: {} ({} records)",
            self.format,
            self.path.display(),
            self.written
        );

        Ok(OutputSummary {
            format: self.format,
            path: self.path.clone(),
            records_written: self.written,
            bytes_written,
        })
    }

    fn format(&self) -> ExportFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::fs;

    fn layout() -> OutputLayout {
        OutputLayout::new(
            vec!["_id".to_string(), "title".to_string(), "body".to_string()],
            "Articles",
        )
    }

    fn record(id: &str, title: &str, body: &str) -> NormalizedRecord {
        let mut record = NormalizedRecord::new(id);
        record.set("title", title);
        record.set("body", body);
        record
    }

    #[tokio::test]
    async fn test_csv_writer_basic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut writer: Box<dyn OutputAdapter> =
            ExportFormat::Csv.open(&path, layout()).await.unwrap();

        writer.write(&record("a1", "article #00001", "<h2>Hi</h2>")).await.unwrap();
        writer.write(&record("a2", "article #00002", "")).await.unwrap();
        let summary = writer.finalize().await.unwrap();

        assert_eq!(summary.records_written, 2);
        assert_eq!(summary.format, ExportFormat::Csv);

        let content = fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["_id,title,body", "a1,article #00001,<h2>Hi</h2>", "a2,article #00002,"]);
        assert_eq!(summary.bytes_written, content.len() as u64);
    }

    #[tokio::test]
    async fn test_csv_writer_with_special_characters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("special.csv");
        let mut writer = ExportFormat::Csv.open(&path, layout()).await.unwrap();

        writer.write(&record("a1", "Hello, world!", "Quote: \"test\"")).await.unwrap();
        writer.write(&record("a2", "Newline\ntest", "x")).await.unwrap();
        writer.finalize().await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("\"Hello, world!\""));
        assert!(content.contains("\"Quote: \"\"test\"\"\""));
        assert!(content.contains("\"Newline\ntest\""));
    }

    #[tokio::test]
    async fn test_tsv_writer_uses_tabs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        let mut writer = ExportFormat::Tsv.open(&path, layout()).await.unwrap();

        writer.write(&record("a1", "with, comma", "plain")).await.unwrap();
        let summary = writer.finalize().await.unwrap();
        assert_eq!(summary.format, ExportFormat::Tsv);

        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "_id\ttitle\tbody\na1\twith, comma\tplain\n");
    }

    #[tokio::test]
    async fn test_header_only_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let writer = ExportFormat::Csv.open(&path, layout()).await.unwrap();
        let summary = writer.finalize().await.unwrap();

        assert_eq!(summary.records_written, 0);
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "_id,title,body\n");
    }

    #[tokio::test]
    async fn test_first_record_adds_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra.csv");
        let mut writer = ExportFormat::Csv.open(&path, layout()).await.unwrap();

        let mut first = record("a1", "one", "b");
        first.set("exportedBy", "editor");
        writer.write(&first).await.unwrap();

        let mut second = record("a2", "two", "c");
        second.set("exportedBy", "admin");
        second.set("late", "ignored");
        writer.write(&second).await.unwrap();
        writer.write(&record("a3", "three", "d")).await.unwrap();
        writer.finalize().await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "_id,title,body,exportedBy",
                "a1,one,b,editor",
                "a2,two,c,admin",
                "a3,three,d,",
            ]
        );
    }

    #[tokio::test]
    async fn test_open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        let err = ExportFormat::Csv.open(&path, layout()).await.err().unwrap();
        assert!(matches!(err, OutputError::CreateFailed(_)));
        assert!(err.is_fatal());
    }
}
