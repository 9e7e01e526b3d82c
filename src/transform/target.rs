//! Output writers shared by the merge and split engines.
//!
//! Rows arrive as raw text. The xlsx sink re-types every cell from the
//! reconciled column schema; the csv sink copies text as is.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::options::{TargetFormat, TransformOptions};
use crate::common::bom::write_utf8_bom;
use crate::common::error::IoResultExt;
use crate::common::{Error, Result};
use crate::ooxml::cell_type::CellType;
use crate::ooxml::reference::cell_name;
use crate::ooxml::schema::SchemaSignature;
use crate::ooxml::writer::{CellValue, StyledCell, XlsxStreamWriter, XlsxTemplate};

const CSV_BUFFER_SIZE: usize = 1024 * 1024;

/// A target file being written: created, header, data rows, finish.
pub trait RowSink {
    fn path(&self) -> &Path;

    fn write_header(&mut self, header: &[String]) -> Result<()>;

    /// Append one data row read from physical row `row` of `source`.
    fn write_row(&mut self, source: &Path, row: u32, cells: &[String]) -> Result<()>;

    /// Data rows written so far.
    fn rows_written(&self) -> u64;

    /// Flush and finalize. Idempotent.
    fn finish(&mut self) -> Result<()>;
}

/// Re-type one cell's text for a column declared as `cell_type`.
///
/// `None` means the text is not a valid value of the type.
pub fn coerce(text: &str, cell_type: &CellType) -> Option<CellValue> {
    if text.is_empty() {
        return Some(CellValue::Null);
    }
    let value = match cell_type {
        CellType::Number | CellType::Unset => match fast_float2::parse::<f64, _>(text) {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(text.to_string()),
        },
        CellType::SharedString | CellType::InlineString | CellType::Unsupported(_) => {
            CellValue::Text(text.to_string())
        },
        CellType::Formula => CellValue::FormulaString(text.to_string()),
        CellType::Bool => CellValue::Bool(parse_bool(text)?),
        CellType::Error if text.starts_with('#') => CellValue::Error(text.to_string()),
        CellType::Error => return None,
        CellType::Date if is_iso_date(text) => CellValue::Date(text.to_string()),
        CellType::Date => return None,
    };
    Some(value)
}

fn parse_bool(text: &str) -> Option<bool> {
    if text == "1" || text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text == "0" || text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn is_iso_date(text: &str) -> bool {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || DateTime::parse_from_rfc3339(text).is_ok()
}

/// xlsx target: cells re-typed and styled from the column schema.
pub struct XlsxSink {
    writer: XlsxStreamWriter,
    schema: SchemaSignature,
    cells: Vec<StyledCell>,
    data_rows: u64,
}

impl XlsxSink {
    pub fn create(path: &Path, template: XlsxTemplate, schema: SchemaSignature) -> Result<Self> {
        Ok(Self {
            writer: XlsxStreamWriter::create(path, template)?,
            schema,
            cells: Vec::new(),
            data_rows: 0,
        })
    }

    fn style_of(&self, column: u32) -> u32 {
        self.schema.get(column).map_or(0, |meta| meta.style_id)
    }
}

impl RowSink for XlsxSink {
    fn path(&self) -> &Path {
        self.writer.path()
    }

    fn write_header(&mut self, header: &[String]) -> Result<()> {
        self.cells.clear();
        for (i, text) in header.iter().enumerate() {
            let style = self.style_of(i as u32 + 1);
            let value = if text.is_empty() {
                CellValue::Null
            } else {
                CellValue::Text(text.clone())
            };
            self.cells.push(StyledCell::new(value, style));
        }
        self.writer.write_row(&self.cells)
    }

    fn write_row(&mut self, source: &Path, row: u32, cells: &[String]) -> Result<()> {
        self.cells.clear();
        for (i, text) in cells.iter().enumerate() {
            let column = i as u32 + 1;
            let Some(meta) = self.schema.get(column) else {
                let value = if text.is_empty() {
                    CellValue::Null
                } else {
                    CellValue::Text(text.clone())
                };
                self.cells.push(StyledCell::new(value, 0));
                continue;
            };
            let value = coerce(text, &meta.cell_type).ok_or_else(|| Error::DataType {
                file: source.display().to_string(),
                cell: cell_name(column, row),
                value: text.clone(),
                cell_type: meta.cell_type.to_string(),
            })?;
            if meta.cell_type.is_numeric() && matches!(value, CellValue::Text(_)) {
                tracing::warn!(
                    file = %source.display(),
                    cell = %cell_name(column, row),
                    value = %text,
                    "not a number, written as text"
                );
            }
            self.cells.push(StyledCell::new(value, meta.style_id));
        }
        self.writer.write_row(&self.cells)?;
        self.data_rows += 1;
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.data_rows
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.finish()
    }
}

/// csv target: text copied as is.
pub struct CsvSink {
    path: PathBuf,
    writer: Option<csv::Writer<BufWriter<File>>>,
    data_rows: u64,
}

impl CsvSink {
    pub fn create(path: &Path, options: &TransformOptions) -> Result<Self> {
        let file = File::create(path).at_path(path)?;
        let mut out = BufWriter::with_capacity(CSV_BUFFER_SIZE, file);
        if options.csv_bom {
            write_utf8_bom(&mut out).at_path(path)?;
        }
        let writer = csv::WriterBuilder::new()
            .delimiter(options.csv_delimiter)
            .flexible(true)
            .from_writer(out);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            data_rows: 0,
        })
    }

    fn writer(&mut self) -> Result<&mut csv::Writer<BufWriter<File>>> {
        self.writer
            .as_mut()
            .ok_or_else(|| Error::InvalidJob(format!("{}: write after finish", self.path.display())))
    }
}

impl RowSink for CsvSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_header(&mut self, header: &[String]) -> Result<()> {
        self.writer()?.write_record(header)?;
        Ok(())
    }

    fn write_row(&mut self, _source: &Path, _row: u32, cells: &[String]) -> Result<()> {
        self.writer()?.write_record(cells)?;
        self.data_rows += 1;
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.data_rows
    }

    fn finish(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush().at_path(&self.path)?;
        tracing::debug!(target_file = %self.path.display(), rows = self.data_rows, "finalized csv target");
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(target_file = %self.path.display(), error = %e, "failed to finalize csv target");
        }
    }
}

/// Everything needed to open targets of one job.
pub(crate) struct SinkFactory<'a> {
    pub format: TargetFormat,
    pub options: &'a TransformOptions,
    /// Styles, theme and column layout for xlsx targets
    pub template: XlsxTemplate,
    /// Column schema for re-typing in xlsx targets
    pub schema: SchemaSignature,
}

impl SinkFactory<'_> {
    pub fn create(&self, path: &Path) -> Result<Box<dyn RowSink>> {
        match self.format {
            TargetFormat::Xlsx => Ok(Box::new(XlsxSink::create(
                path,
                self.template.clone(),
                self.schema.clone(),
            )?)),
            TargetFormat::Csv => Ok(Box::new(CsvSink::create(path, self.options)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::bom::{UTF8_BOM, strip_utf8_bom};
    use crate::ooxml::schema::ColumnMeta;
    use crate::test_support::read_rows;
    use std::collections::BTreeMap;

    fn schema(cols: &[(u32, CellType)]) -> SchemaSignature {
        SchemaSignature::new(
            cols.iter()
                .map(|(s, t)| ColumnMeta { style_id: *s, cell_type: t.clone() })
                .enumerate()
                .map(|(i, m)| (i as u32 + 1, m))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(coerce("", &CellType::Number), Some(CellValue::Null));
        assert_eq!(coerce("42", &CellType::Unset), Some(CellValue::Number(42.0)));
        assert_eq!(coerce("-1.5e3", &CellType::Number), Some(CellValue::Number(-1500.0)));
        assert_eq!(
            coerce("n/a", &CellType::Number),
            Some(CellValue::Text("n/a".to_string()))
        );
        assert_eq!(
            coerce("inf", &CellType::Number),
            Some(CellValue::Text("inf".to_string()))
        );
    }

    #[test]
    fn test_coerce_best_effort_types() {
        assert_eq!(coerce("TRUE", &CellType::Bool), Some(CellValue::Bool(true)));
        assert_eq!(coerce("0", &CellType::Bool), Some(CellValue::Bool(false)));
        assert_eq!(coerce("yes", &CellType::Bool), None);
        assert_eq!(
            coerce("#DIV/0!", &CellType::Error),
            Some(CellValue::Error("#DIV/0!".to_string()))
        );
        assert_eq!(coerce("oops", &CellType::Error), None);
        assert!(coerce("2024-02-29", &CellType::Date).is_some());
        assert!(coerce("2024-02-29T10:30:00", &CellType::Date).is_some());
        assert!(coerce("2024-02-29T10:30:00Z", &CellType::Date).is_some());
        assert_eq!(coerce("29/02/2024", &CellType::Date), None);
        assert_eq!(
            coerce("x", &CellType::Formula),
            Some(CellValue::FormulaString("x".to_string()))
        );
        assert_eq!(
            coerce("raw", &CellType::Unsupported("q".into())),
            Some(CellValue::Text("raw".to_string()))
        );
    }

    #[test]
    fn test_xlsx_sink_types_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut sink = XlsxSink::create(
            &path,
            XlsxTemplate::default(),
            schema(&[(0, CellType::Number), (0, CellType::SharedString), (0, CellType::Bool)]),
        )
        .unwrap();
        sink.write_header(&["n".into(), "s".into(), "b".into()]).unwrap();
        sink.write_row(Path::new("a.xlsx"), 2, &["1.5".into(), "x".into(), "1".into()])
            .unwrap();
        let err = sink
            .write_row(Path::new("a.xlsx"), 3, &["2".into(), "y".into(), "maybe".into()])
            .unwrap_err();
        match err {
            Error::DataType { file, cell, value, .. } => {
                assert_eq!(file, "a.xlsx");
                assert_eq!(cell, "C3");
                assert_eq!(value, "maybe");
            },
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sink.rows_written(), 1);
        sink.finish().unwrap();

        assert_eq!(
            read_rows(&path),
            vec![vec!["n", "s", "b"], vec!["1.5", "x", "1"]]
        );
    }

    #[test]
    fn test_csv_sink_writes_bom_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::create(&path, &TransformOptions::default()).unwrap();
        sink.write_header(&["id".into(), "note".into()]).unwrap();
        sink.write_row(Path::new("a.xlsx"), 2, &["1".into(), "a, b".into()]).unwrap();
        sink.write_row(Path::new("a.xlsx"), 3, &["2".into()]).unwrap();
        sink.finish().unwrap();
        sink.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], &UTF8_BOM);
        assert_eq!(
            String::from_utf8(strip_utf8_bom(&bytes).to_vec()).unwrap(),
            "id,note\n1,\"a, b\"\n2\n"
        );
    }

    #[test]
    fn test_csv_sink_without_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let opts = TransformOptions::default().with_csv_bom(false).with_csv_delimiter(b';');
        let mut sink = CsvSink::create(&path, &opts).unwrap();
        sink.write_header(&["a".into(), "b".into()]).unwrap();
        drop(sink);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a;b\n");
    }
}
