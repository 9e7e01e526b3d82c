//! Per-column schema of a worksheet, probed from its first data row.
//!
//! Only the XML up to the closing tag of row 2 is parsed. Column formatting
//! is assumed to be uniform down each column, so one row is enough to learn
//! every column's style and declared type.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::archive::Archive;
use super::cell_type::CellType;
use super::reference::column_to_letters;
use super::workbook::locate_primary_sheet;
use super::{CellAttrs, row_number};
use crate::common::{Error, Result};

/// Physical row holding the first data row.
pub const DATA_ROW: u32 = 2;

/// Style and declared type of one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnMeta {
    /// Index into the workbook's cell formats (`s` attribute)
    pub style_id: u32,
    /// Declared type (`t` attribute)
    pub cell_type: CellType,
}

/// One `<col>` element: width and visibility for a column range.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub min: u32,
    pub max: u32,
    pub width: Option<f64>,
    pub style: Option<u32>,
    pub hidden: bool,
    pub custom_width: bool,
}

/// Column widths and visibility declared before `<sheetData>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnLayout {
    pub columns: Vec<ColumnSpec>,
}

impl ColumnLayout {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Column index (1-based) -> [`ColumnMeta`] for one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSignature {
    columns: BTreeMap<u32, ColumnMeta>,
    layout: ColumnLayout,
}

impl SchemaSignature {
    pub fn new(columns: BTreeMap<u32, ColumnMeta>) -> Self {
        Self {
            columns,
            layout: ColumnLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: ColumnLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Number of cells in the probed row.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, column: u32) -> Option<&ColumnMeta> {
        self.columns.get(&column)
    }

    /// Columns in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &ColumnMeta)> {
        self.columns.iter().map(|(col, meta)| (*col, meta))
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Columns whose declared type is only copied on a best-effort basis.
    pub fn unsupported_columns(&self) -> Vec<(u32, CellType)> {
        self.iter()
            .filter(|(_, meta)| !meta.cell_type.is_supported())
            .map(|(col, meta)| (col, meta.cell_type.clone()))
            .collect()
    }
}

/// Probe the primary worksheet of the workbook at `path`.
///
/// Fails with [`Error::Format`] if the worksheet is missing or has no row 2.
pub fn probe(path: impl AsRef<Path>) -> Result<SchemaSignature> {
    let path = path.as_ref();
    let mut archive = Archive::open(path)?;
    let sheet = locate_primary_sheet(&mut archive)?;
    let entry = archive.entry(&sheet.entry)?;
    let mut reader = Reader::from_reader(BufReader::new(entry));

    let mut buf = Vec::with_capacity(4096);
    let mut layout = ColumnLayout::default();
    let mut columns = BTreeMap::new();
    let mut in_sheet_data = false;
    let mut in_target = false;
    let mut last_row = 0u32;
    let mut next_col = 1u32;

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::Xml(format!("{}: {e}", path.display())))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) if !in_sheet_data => {
                match e.local_name().as_ref() {
                    b"col" => layout.columns.extend(column_spec(e)),
                    b"sheetData" => in_sheet_data = matches!(event, Event::Start(_)),
                    _ => {},
                }
            },
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"row" => {
                let number = row_number(e).unwrap_or(last_row.saturating_add(1));
                last_row = number;
                if number > DATA_ROW {
                    break;
                }
                if number == DATA_ROW {
                    if matches!(event, Event::Empty(_)) {
                        return Ok(finish(path, columns, layout));
                    }
                    in_target = true;
                    next_col = 1;
                }
            },
            Event::Start(ref e) | Event::Empty(ref e)
                if in_target && e.local_name().as_ref() == b"c" =>
            {
                let attrs = CellAttrs::read(e);
                let column = attrs.column.unwrap_or(next_col);
                next_col = column + 1;
                columns.insert(
                    column,
                    ColumnMeta {
                        style_id: attrs.style,
                        cell_type: CellType::from_raw(attrs.raw_type.as_deref()),
                    },
                );
            },
            Event::End(ref e) if e.local_name().as_ref() == b"row" && in_target => {
                return Ok(finish(path, columns, layout));
            },
            Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => break,
            Event::Eof => break,
            _ => {},
        }
    }

    Err(Error::Format(format!(
        "{}: worksheet has no data row {DATA_ROW}",
        path.display()
    )))
}

fn finish(path: &Path, columns: BTreeMap<u32, ColumnMeta>, layout: ColumnLayout) -> SchemaSignature {
    let signature = SchemaSignature::new(columns).with_layout(layout);
    tracing::debug!(
        source = %path.display(),
        columns = signature.column_count(),
        schema = %describe(&signature),
        "probed schema"
    );
    signature
}

/// `A:s0/number B:s3/shared string ...` for log output.
fn describe(signature: &SchemaSignature) -> String {
    signature
        .iter()
        .map(|(col, meta)| format!("{}:s{}/{}", column_to_letters(col), meta.style_id, meta.cell_type))
        .collect::<Vec<_>>()
        .join(" ")
}

fn column_spec(e: &BytesStart<'_>) -> Option<ColumnSpec> {
    let mut min = None;
    let mut max = None;
    let mut spec = ColumnSpec {
        min: 0,
        max: 0,
        width: None,
        style: None,
        hidden: false,
        custom_width: false,
    };
    for attr in e.attributes().flatten() {
        let value = attr.value.as_ref();
        match attr.key.local_name().as_ref() {
            b"min" => min = atoi_simd::parse::<u32>(value).ok(),
            b"max" => max = atoi_simd::parse::<u32>(value).ok(),
            b"width" => spec.width = fast_float2::parse::<f64, _>(value).ok(),
            b"style" => spec.style = atoi_simd::parse::<u32>(value).ok(),
            b"hidden" => spec.hidden = is_true(value),
            b"customWidth" => spec.custom_width = is_true(value),
            _ => {},
        }
    }
    spec.min = min?;
    spec.max = max.unwrap_or(spec.min).max(spec.min);
    Some(spec)
}

#[inline]
fn is_true(value: &[u8]) -> bool {
    matches!(value, b"1" | b"true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SheetFixture;

    #[test]
    fn test_probe_reads_row_two() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xlsx");
        SheetFixture::new(&["id", "name", "score"])
            .column_styles(&[2, 0, 5])
            .column_types(&["n", "s", ""])
            .row(&["1", "alpha", "3.5"])
            .row(&["2", "beta", "x"])
            .write(&path);

        let sig = probe(&path).unwrap();
        assert_eq!(sig.column_count(), 3);
        assert_eq!(
            sig.get(1),
            Some(&ColumnMeta { style_id: 2, cell_type: CellType::Number })
        );
        assert_eq!(
            sig.get(2),
            Some(&ColumnMeta { style_id: 0, cell_type: CellType::SharedString })
        );
        assert_eq!(
            sig.get(3),
            Some(&ColumnMeta { style_id: 5, cell_type: CellType::Unset })
        );
        assert!(sig.unsupported_columns().is_empty());
    }

    #[test]
    fn test_probe_flags_unsupported_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.xlsx");
        SheetFixture::new(&["flag", "when"])
            .column_types(&["b", "x-odd"])
            .row(&["1", "2024-01-01"])
            .write(&path);

        let sig = probe(&path).unwrap();
        assert_eq!(
            sig.unsupported_columns(),
            vec![
                (1, CellType::Bool),
                (2, CellType::Unsupported("x-odd".to_string()))
            ]
        );
    }

    #[test]
    fn test_probe_captures_column_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.xlsx");
        SheetFixture::new(&["a", "b"])
            .column_width(1, 2, 18.5)
            .row(&["1", "2"])
            .write(&path);

        let sig = probe(&path).unwrap();
        let layout = sig.layout();
        assert_eq!(layout.columns.len(), 1);
        assert_eq!(layout.columns[0].min, 1);
        assert_eq!(layout.columns[0].max, 2);
        assert_eq!(layout.columns[0].width, Some(18.5));
        assert!(layout.columns[0].custom_width);
    }

    #[test]
    fn test_probe_without_data_row_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("header_only.xlsx");
        SheetFixture::new(&["a", "b"]).write(&path);

        assert!(matches!(probe(&path), Err(Error::Format(_))));
    }

    #[test]
    fn test_probe_handles_unnumbered_rows_and_cells() {
        let xml = r#"<worksheet><sheetData>
<row><c t="inlineStr"><is><t>h1</t></is></c><c t="inlineStr"><is><t>h2</t></is></c></row>
<row><c s="4"><v>1</v></c><c s="7" t="s"><v>0</v></c></row>
</sheetData></worksheet>"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.xlsx");
        SheetFixture::write_raw_sheet(&path, xml);

        let sig = probe(&path).unwrap();
        assert_eq!(sig.column_count(), 2);
        assert_eq!(sig.get(1).map(|m| m.style_id), Some(4));
        assert_eq!(sig.get(2).map(|m| m.cell_type.clone()), Some(CellType::SharedString));
    }

    #[test]
    fn test_probe_stops_when_row_two_is_skipped() {
        let xml = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>h</t></is></c></row>
<row r="3"><c r="A3"><v>1</v></c></row>
</sheetData></worksheet>"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gap.xlsx");
        SheetFixture::write_raw_sheet(&path, xml);

        assert!(matches!(probe(&path), Err(Error::Format(_))));
    }
}
