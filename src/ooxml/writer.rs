//! Streaming xlsx writer.
//!
//! The worksheet entry is opened first and rows are serialized straight into
//! it, so only the current row is ever held in memory. Strings are written as
//! inline strings, which avoids keeping a shared string table for the whole
//! output. The remaining package parts are small and are written by
//! [`XlsxStreamWriter::finish`].

use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::archive::Archive;
use super::reference::{MAX_ROWS, column_to_letters};
use super::schema::ColumnLayout;
use crate::common::error::IoResultExt;
use crate::common::xml::escape_xml;
use crate::common::{Error, Result};

const SHEET_PART: &str = "xl/worksheets/sheet1.xml";
const STYLES_PART: &str = "xl/styles.xml";
const THEME_PART: &str = "xl/theme/theme1.xml";

const OUTPUT_BUFFER_SIZE: usize = 1024 * 1024;

/// Characters Excel refuses in sheet names.
const SHEET_NAME_ILLEGAL: [char; 7] = ['*', ':', '?', '/', '\\', '[', ']'];
/// Longest sheet name Excel accepts.
const SHEET_NAME_MAX_LEN: usize = 31;

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const DEFAULT_STYLES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/><family val="2"/></font></fonts>"#,
    r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
    r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>"#,
    r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
    r#"</styleSheet>"#
);

/// Value of one output cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// No value; only the style (if any) is written
    Null,
    Number(f64),
    /// Written as an inline string
    Text(String),
    Bool(bool),
    /// ISO-8601 date or date-time text (`t="d"`)
    Date(String),
    /// Error literal such as `#N/A` (`t="e"`)
    Error(String),
    /// Cached formula string result (`t="str"`)
    FormulaString(String),
}

/// A value plus the cell format index it is written with.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledCell {
    pub value: CellValue,
    pub style: u32,
}

impl StyledCell {
    pub fn new(value: CellValue, style: u32) -> Self {
        Self { value, style }
    }

    pub fn text(text: impl Into<String>, style: u32) -> Self {
        Self::new(CellValue::Text(text.into()), style)
    }
}

/// Package-level parts an output is created with.
///
/// Style ids written by [`XlsxStreamWriter::write_row`] index into the styles
/// part of the template, so a template taken from a source keeps every
/// source style id meaningful.
#[derive(Debug, Clone)]
pub struct XlsxTemplate {
    styles: Option<Vec<u8>>,
    theme: Option<Vec<u8>>,
    layout: ColumnLayout,
    sheet_name: String,
}

impl Default for XlsxTemplate {
    fn default() -> Self {
        Self {
            styles: None,
            theme: None,
            layout: ColumnLayout::default(),
            sheet_name: "Sheet1".to_string(),
        }
    }
}

impl XlsxTemplate {
    /// Take the styles and theme of the workbook at `path`.
    pub fn from_source(path: impl AsRef<Path>) -> Result<Self> {
        let mut archive = Archive::open(path)?;
        Ok(Self {
            styles: archive.read_bytes(STYLES_PART)?,
            theme: archive.read_bytes(THEME_PART)?,
            ..Self::default()
        })
    }

    pub fn with_layout(mut self, layout: ColumnLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the output sheet name; illegal characters are replaced.
    pub fn with_sheet_name(mut self, name: &str) -> Self {
        self.sheet_name = sanitize_sheet_name(name);
        self
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }
}

/// Replace characters Excel rejects in sheet names and clamp the length.
pub fn sanitize_sheet_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if SHEET_NAME_ILLEGAL.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        return "Sheet".to_string();
    }
    trimmed.chars().take(SHEET_NAME_MAX_LEN).collect()
}

/// Writes one worksheet row by row into a new xlsx package.
pub struct XlsxStreamWriter {
    path: PathBuf,
    zip: Option<ZipWriter<BufWriter<File>>>,
    template: XlsxTemplate,
    rows_written: u32,
    line: String,
}

impl XlsxStreamWriter {
    /// Create the package at `path` and open its worksheet for writing.
    pub fn create(path: impl AsRef<Path>, template: XlsxTemplate) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).at_path(path)?;
        let mut zip = ZipWriter::new(BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file));
        zip.start_file(SHEET_PART, deflated().large_file(true))?;

        let mut head = String::with_capacity(512);
        head.push_str(XML_DECL);
        head.push_str(concat!(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#
        ));
        write_cols(&mut head, &template.layout);
        head.push_str("<sheetData>");
        zip.write_all(head.as_bytes()).at_path(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            zip: Some(zip),
            template,
            rows_written: 0,
            line: String::with_capacity(4096),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far, header included.
    #[inline]
    pub fn rows_written(&self) -> u32 {
        self.rows_written
    }

    /// Append `cells` as the next row, starting at column A.
    pub fn write_row(&mut self, cells: &[StyledCell]) -> Result<()> {
        let Some(zip) = self.zip.as_mut() else {
            return Err(Error::InvalidJob(format!(
                "{}: write after finish",
                self.path.display()
            )));
        };
        if self.rows_written >= MAX_ROWS {
            return Err(Error::RowLimit {
                path: self.path.clone(),
                limit: MAX_ROWS,
            });
        }

        let row = self.rows_written + 1;
        let mut itoa_buf = itoa::Buffer::new();
        let row_str = itoa_buf.format(row);

        self.line.clear();
        self.line.push_str(r#"<row r=""#);
        self.line.push_str(row_str);
        self.line.push_str(r#"">"#);
        for (i, cell) in cells.iter().enumerate() {
            write_cell(&mut self.line, &column_to_letters(i as u32 + 1), row_str, cell);
        }
        self.line.push_str("</row>");

        zip.write_all(self.line.as_bytes()).at_path(&self.path)?;
        self.rows_written = row;
        Ok(())
    }

    /// Close the worksheet and write the rest of the package.
    ///
    /// Calling it again is a no-op.
    pub fn finish(&mut self) -> Result<()> {
        let Some(mut zip) = self.zip.take() else {
            return Ok(());
        };
        zip.write_all(b"</sheetData></worksheet>").at_path(&self.path)?;

        let has_theme = self.template.theme.is_some();
        let parts: [(&str, Vec<u8>); 5] = [
            ("[Content_Types].xml", content_types(has_theme).into_bytes()),
            ("_rels/.rels", package_rels().into_bytes()),
            ("xl/workbook.xml", workbook_xml(&self.template.sheet_name).into_bytes()),
            ("xl/_rels/workbook.xml.rels", workbook_rels(has_theme).into_bytes()),
            (
                STYLES_PART,
                self.template
                    .styles
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STYLES.as_bytes().to_vec()),
            ),
        ];
        for (name, bytes) in parts {
            zip.start_file(name, deflated())?;
            zip.write_all(&bytes).at_path(&self.path)?;
        }
        if let Some(theme) = &self.template.theme {
            zip.start_file(THEME_PART, deflated())?;
            zip.write_all(theme).at_path(&self.path)?;
        }

        let mut out = zip.finish()?;
        out.flush().at_path(&self.path)?;
        tracing::debug!(
            target_file = %self.path.display(),
            rows = self.rows_written,
            "finalized xlsx target"
        );
        Ok(())
    }
}

impl Drop for XlsxStreamWriter {
    fn drop(&mut self) {
        if self.zip.is_some()
            && let Err(e) = self.finish()
        {
            tracing::warn!(target_file = %self.path.display(), error = %e, "failed to finalize xlsx target");
        }
    }
}

#[inline]
fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn write_cols(xml: &mut String, layout: &ColumnLayout) {
    if layout.is_empty() {
        return;
    }
    xml.push_str("<cols>");
    for col in &layout.columns {
        let _ = write!(xml, r#"<col min="{}" max="{}""#, col.min, col.max);
        if let Some(width) = col.width {
            xml.push_str(r#" width=""#);
            xml.push_str(ryu::Buffer::new().format(width));
            xml.push('"');
        }
        if let Some(style) = col.style {
            let _ = write!(xml, r#" style="{style}""#);
        }
        if col.hidden {
            xml.push_str(r#" hidden="1""#);
        }
        if col.custom_width {
            xml.push_str(r#" customWidth="1""#);
        }
        xml.push_str("/>");
    }
    xml.push_str("</cols>");
}

fn write_cell(xml: &mut String, col: &str, row: &str, cell: &StyledCell) {
    if cell.value == CellValue::Null && cell.style == 0 {
        return;
    }

    xml.push_str(r#"<c r=""#);
    xml.push_str(col);
    xml.push_str(row);
    xml.push('"');
    if cell.style != 0 {
        let _ = write!(xml, r#" s="{}""#, cell.style);
    }

    match &cell.value {
        CellValue::Null => xml.push_str("/>"),
        CellValue::Number(n) => {
            xml.push_str("><v>");
            push_number(xml, *n);
            xml.push_str("</v></c>");
        },
        CellValue::Text(s) => {
            xml.push_str(r#" t="inlineStr"><is><t xml:space="preserve">"#);
            xml.push_str(&escape_xml(s));
            xml.push_str("</t></is></c>");
        },
        CellValue::Bool(b) => {
            xml.push_str(if *b { r#" t="b"><v>1</v></c>"# } else { r#" t="b"><v>0</v></c>"# });
        },
        CellValue::Date(s) => push_typed(xml, "d", s),
        CellValue::Error(s) => push_typed(xml, "e", s),
        CellValue::FormulaString(s) => push_typed(xml, "str", s),
    }
}

fn push_typed(xml: &mut String, t: &str, text: &str) {
    let _ = write!(xml, r#" t="{t}"><v>{}</v></c>"#, escape_xml(text));
}

/// Integral values print without a fractional part.
fn push_number(xml: &mut String, n: f64) {
    const EXACT_INT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() < EXACT_INT {
        xml.push_str(itoa::Buffer::new().format(n as i64));
    } else {
        xml.push_str(ryu::Buffer::new().format(n));
    }
}

fn content_types(has_theme: bool) -> String {
    let mut xml = String::with_capacity(1024);
    xml.push_str(XML_DECL);
    xml.push_str(concat!(
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
        r#"<Default Extension="xml" ContentType="application/xml"/>"#,
        r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
        r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
        r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    ));
    if has_theme {
        xml.push_str(r#"<Override PartName="/xl/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>"#);
    }
    xml.push_str("</Types>");
    xml
}

fn package_rels() -> String {
    let mut xml = String::with_capacity(512);
    xml.push_str(XML_DECL);
    xml.push_str(concat!(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
        r#"</Relationships>"#
    ));
    xml
}

fn workbook_xml(sheet_name: &str) -> String {
    let mut xml = String::with_capacity(512);
    xml.push_str(XML_DECL);
    xml.push_str(concat!(
        r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
        r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        r#"<sheets>"#
    ));
    let _ = write!(
        xml,
        r#"<sheet name="{}" sheetId="1" r:id="rId1"/>"#,
        escape_xml(sheet_name)
    );
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels(has_theme: bool) -> String {
    let mut xml = String::with_capacity(768);
    xml.push_str(XML_DECL);
    xml.push_str(concat!(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
        r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
    ));
    if has_theme {
        xml.push_str(r#"<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme" Target="theme/theme1.xml"/>"#);
    }
    xml.push_str("</Relationships>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::rows::RowStream;
    use crate::ooxml::schema::{ColumnSpec, probe};
    use crate::ooxml::workbook::locate_primary_sheet;
    use crate::test_support::SheetFixture;

    fn sheet_xml(path: &Path) -> String {
        let mut archive = Archive::open(path).unwrap();
        String::from_utf8(archive.read_bytes(SHEET_PART).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_written_package_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut writer = XlsxStreamWriter::create(&path, XlsxTemplate::default().with_sheet_name("Data")).unwrap();
        writer
            .write_row(&[StyledCell::text("id", 0), StyledCell::text("name & co", 0)])
            .unwrap();
        writer
            .write_row(&[
                StyledCell::new(CellValue::Number(42.0), 0),
                StyledCell::text("<alpha>", 0),
            ])
            .unwrap();
        writer
            .write_row(&[StyledCell::new(CellValue::Number(0.25), 0)])
            .unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert_eq!(writer.rows_written(), 3);

        let mut archive = Archive::open(&path).unwrap();
        let loc = locate_primary_sheet(&mut archive).unwrap();
        assert_eq!(loc.name.as_deref(), Some("Data"));

        let rows: Vec<Vec<String>> = RowStream::open(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["id", "name & co"],
                vec!["42", "<alpha>"],
                vec!["0.25"],
            ]
        );
    }

    #[test]
    fn test_styles_and_typed_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typed.xlsx");
        let mut writer = XlsxStreamWriter::create(&path, XlsxTemplate::default()).unwrap();
        writer
            .write_row(&[
                StyledCell::new(CellValue::Null, 4),
                StyledCell::new(CellValue::Null, 0),
                StyledCell::new(CellValue::Bool(true), 0),
                StyledCell::new(CellValue::Date("2024-03-01".into()), 2),
                StyledCell::new(CellValue::Error("#N/A".into()), 0),
                StyledCell::new(CellValue::FormulaString("x".into()), 0),
            ])
            .unwrap();
        writer.finish().unwrap();

        let xml = sheet_xml(&path);
        assert!(xml.contains(r#"<c r="A1" s="4"/>"#), "{xml}");
        assert!(!xml.contains(r#"<c r="B1""#));
        assert!(xml.contains(r#"<c r="C1" t="b"><v>1</v></c>"#));
        assert!(xml.contains(r#"<c r="D1" s="2" t="d"><v>2024-03-01</v></c>"#));
        assert!(xml.contains(r#"<c r="E1" t="e"><v>#N/A</v></c>"#));
        assert!(xml.contains(r#"<c r="F1" t="str"><v>x</v></c>"#));
    }

    #[test]
    fn test_template_copies_source_styles_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.xlsx");
        SheetFixture::new(&["a", "b"])
            .column_styles(&[1, 2])
            .column_width(1, 1, 30.0)
            .row(&["1", "2"])
            .write(&src);

        let layout = probe(&src).unwrap().layout().clone();
        let template = XlsxTemplate::from_source(&src).unwrap().with_layout(layout);
        let out = dir.path().join("out.xlsx");
        let mut writer = XlsxStreamWriter::create(&out, template).unwrap();
        writer.write_row(&[StyledCell::new(CellValue::Number(1.0), 2)]).unwrap();
        writer.finish().unwrap();

        let mut src_archive = Archive::open(&src).unwrap();
        let mut out_archive = Archive::open(&out).unwrap();
        assert_eq!(
            src_archive.read_bytes(STYLES_PART).unwrap(),
            out_archive.read_bytes(STYLES_PART).unwrap()
        );
        let xml = sheet_xml(&out);
        assert!(xml.contains(r#"<cols><col min="1" max="1" width="30.0" customWidth="1"/></cols>"#), "{xml}");
    }

    #[test]
    fn test_drop_finalizes_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.xlsx");
        {
            let mut writer = XlsxStreamWriter::create(&path, XlsxTemplate::default()).unwrap();
            writer.write_row(&[StyledCell::text("only", 0)]).unwrap();
        }
        let rows: Vec<Vec<String>> = RowStream::open(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![vec!["only"]]);
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("a/b:c"), "a_b_c");
        assert_eq!(sanitize_sheet_name("   "), "Sheet");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).len(), 31);
        assert_eq!(sanitize_sheet_name(" [Q1] "), "_Q1_");
    }

    #[test]
    fn test_number_formatting() {
        let mut s = String::new();
        push_number(&mut s, 3.0);
        s.push('|');
        push_number(&mut s, -0.5);
        s.push('|');
        push_number(&mut s, 1e300);
        assert_eq!(s, "3|-0.5|1e300");
    }

    #[test]
    fn test_column_spec_roundtrip_attributes() {
        let mut xml = String::new();
        write_cols(
            &mut xml,
            &ColumnLayout {
                columns: vec![ColumnSpec {
                    min: 2,
                    max: 4,
                    width: Some(9.5),
                    style: Some(3),
                    hidden: true,
                    custom_width: false,
                }],
            },
        );
        assert_eq!(
            xml,
            r#"<cols><col min="2" max="4" width="9.5" style="3" hidden="1"/></cols>"#
        );
    }
}
