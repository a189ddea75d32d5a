//! Excel workbook writer
//!
//! Spreadsheets need the whole sheet laid out at once, so this adapter keeps
//! records in memory and renders the workbook when finalized. The header row
//! uses the column names in bold; body cells wrap, align to the top and carry
//! thin borders; every column is 25 characters wide. Fields a record carries
//! beyond the layout get their own columns after the layout's.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, XlsxError};
use tracing::debug;

use crate::error::OutputError;
use crate::normalize::NormalizedRecord;
use crate::schema::ID_FIELD;

use super::{ExportFormat, OutputAdapter, OutputLayout, OutputSummary, file_size};

/// Width of every column, in characters.
const COLUMN_WIDTH: f64 = 25.0;

/// Rows per worksheet, header included.
const MAX_ROWS: usize = 1_048_576;

/// Columns per worksheet.
const MAX_COLUMNS: usize = 16_384;

/// Characters a single cell can hold.
const MAX_CELL_CHARS: usize = 32_767;

/// Buffering writer for `.xlsx` workbooks
pub struct SpreadsheetWriter {
    path: PathBuf,
    layout: OutputLayout,
    records: Vec<NormalizedRecord>,
}

impl SpreadsheetWriter {
    /// Create a writer that will render to `path` when finalized
    pub fn new(path: &Path, layout: OutputLayout) -> Self {
        Self {
            path: path.to_path_buf(),
            layout,
            records: Vec::new(),
        }
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl OutputAdapter for SpreadsheetWriter {
    async fn write(&mut self, record: &NormalizedRecord) -> Result<(), OutputError> {
        if self.records.len() + 1 >= MAX_ROWS {
            return Err(OutputError::RenderFailed(format!(
                "sheet is full at {} rows",
                MAX_ROWS
            )));
        }

        if let Some((column, _)) = record
            .iter()
            .filter(|(name, _)| *name != ID_FIELD)
            .find(|(_, value)| value.chars().count() > MAX_CELL_CHARS)
        {
            return Err(OutputError::Serialize {
                record_id: record.id().to_string(),
                message: format!("value of '{}' exceeds {} characters", column, MAX_CELL_CHARS),
            });
        }

        self.layout.extend_with(record);
        self.records.push(record.clone());
        Ok(())
    }

    async fn finalize(self: Box<Self>) -> Result<OutputSummary, OutputError> {
        let SpreadsheetWriter {
            path,
            layout,
            records,
        } = *self;
        let records_written = records.len() as u64;

        debug!(
            "Rendering {} rows to workbook: {}",
            records_written,
            path.display()
        );

        let render_path = path.clone();
        tokio::task::spawn_blocking(move || render_workbook(&render_path, &layout, &records))
            .await
            .map_err(|e| OutputError::RenderFailed(format!("render task failed: {}", e)))?
            .map_err(|e| OutputError::RenderFailed(e.to_string()))?;

        Ok(OutputSummary {
            format: ExportFormat::Xlsx,
            bytes_written: file_size(&path).await?,
            path,
            records_written,
        })
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Xlsx
    }
}

/// Render the header and every buffered row into one worksheet
fn render_workbook(
    path: &Path,
    layout: &OutputLayout,
    records: &[NormalizedRecord],
) -> Result<(), XlsxError> {
    if layout.columns.len() > MAX_COLUMNS {
        return Err(XlsxError::ParameterError(format!(
            "{} columns exceed the sheet limit of {}",
            layout.columns.len(),
            MAX_COLUMNS
        )));
    }

    let header_format = Format::new().set_bold();
    let cell_format = Format::new()
        .set_font_size(11)
        .set_text_wrap()
        .set_align(FormatAlign::Top)
        .set_background_color(Color::White)
        .set_border(FormatBorder::Thin);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&layout.sheet_name)?;

    for (col, name) in layout.columns.iter().enumerate() {
        let col = col as u16;
        worksheet.set_column_width(col, COLUMN_WIDTH)?;
        worksheet.write_string_with_format(0, col, name, &header_format)?;
    }

    for (index, record) in records.iter().enumerate() {
        let row_num = (index + 1) as u32;
        for (col, value) in record.row(&layout.columns).enumerate() {
            worksheet.write_string_with_format(row_num, col as u16, value, &cell_format)?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn layout() -> OutputLayout {
        OutputLayout::new(
            vec!["title".to_string(), "plainText".to_string()],
            "Products",
        )
    }

    /// Read one XML part of the workbook package
    fn read_part(path: &Path, part: &str) -> String {
        let file = std::fs::File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut out = String::new();
        archive.by_name(part).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn test_buffers_until_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut writer = SpreadsheetWriter::new(&path, layout());

        let mut record = NormalizedRecord::new("p1");
        record.set("title", "product #00001");
        writer.write(&record).await.unwrap();

        assert_eq!(writer.len(), 1);
        assert!(!path.exists());

        let summary = Box::new(writer).finalize().await.unwrap();
        assert!(path.exists());
        assert_eq!(summary.records_written, 1);
        assert_eq!(summary.format, ExportFormat::Xlsx);
        assert!(summary.bytes_written > 0);
    }

    #[tokio::test]
    async fn test_header_follows_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.xlsx");
        let mut writer = SpreadsheetWriter::new(&path, layout());

        for i in 1..=3 {
            let mut record = NormalizedRecord::new(format!("p{i}"));
            record.set("title", format!("product #0000{i}"));
            record.set("plainText", "This is plain text.");
            writer.write(&record).await.unwrap();
        }
        Box::new(writer).finalize().await.unwrap();

        let strings = read_part(&path, "xl/sharedStrings.xml");
        let title = strings.find("<t>title</t>").unwrap();
        let plain = strings.find("<t>plainText</t>").unwrap();
        assert!(title < plain);
        assert!(!strings.contains("<t>_id</t>"));
        assert!(!strings.contains("<t>p1</t>"));
        assert!(strings.contains("<t>product #00001</t>"));
        assert!(strings.contains("<t>This is plain text.</t>"));

        let workbook = read_part(&path, "xl/workbook.xml");
        assert!(workbook.contains("name=\"Products\""));

        let sheet = read_part(&path, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("<dimension ref=\"A1:B4\"/>"));
    }

    #[tokio::test]
    async fn test_added_fields_get_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra.xlsx");
        let mut writer = SpreadsheetWriter::new(&path, layout());

        let mut first = NormalizedRecord::new("p1");
        first.set("title", "first");
        writer.write(&first).await.unwrap();

        let mut second = NormalizedRecord::new("p2");
        second.set("title", "second");
        second.set("exportedBy", "editor");
        writer.write(&second).await.unwrap();
        Box::new(writer).finalize().await.unwrap();

        let strings = read_part(&path, "xl/sharedStrings.xml");
        assert!(strings.contains("<t>exportedBy</t>"));
        assert!(strings.contains("<t>editor</t>"));

        let sheet = read_part(&path, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("<dimension ref=\"A1:C3\"/>"));
    }

    #[tokio::test]
    async fn test_oversized_cell_rejects_only_that_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.xlsx");
        let mut writer = SpreadsheetWriter::new(&path, layout());

        let mut huge = NormalizedRecord::new("p1");
        huge.set("plainText", "x".repeat(MAX_CELL_CHARS + 1));
        let err = writer.write(&huge).await.unwrap_err();
        assert!(!err.is_fatal());

        writer.write(&NormalizedRecord::new("p2")).await.unwrap();
        assert_eq!(writer.len(), 1);
    }

    #[tokio::test]
    async fn test_render_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.xlsx");
        let writer = SpreadsheetWriter::new(&path, layout());

        let err = Box::new(writer).finalize().await.unwrap_err();
        assert!(matches!(err, OutputError::RenderFailed(_)));
    }
}
