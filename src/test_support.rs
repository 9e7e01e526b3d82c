//! Builders for small but genuine xlsx packages used by the unit tests.

use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::common::xml::escape_xml;
use crate::ooxml::reference::cell_name;

const CELL_XFS: usize = 8;

/// A one-sheet workbook: a header row written through the shared string
/// table, then data rows typed and styled per column.
#[derive(Debug, Clone)]
pub struct SheetFixture {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    styles: Vec<u32>,
    types: Option<Vec<String>>,
    widths: Vec<(u32, u32, f64)>,
    sheet_entry: String,
    sheet_name: String,
    with_workbook: bool,
    method: CompressionMethod,
}

impl SheetFixture {
    pub fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
            styles: Vec::new(),
            types: None,
            widths: Vec::new(),
            sheet_entry: "xl/worksheets/sheet1.xml".to_string(),
            sheet_name: "Sheet1".to_string(),
            with_workbook: true,
            method: CompressionMethod::Deflated,
        }
    }

    pub fn row(mut self, cells: &[&str]) -> Self {
        self.rows.push(cells.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Append `count` rows `[i, "name-i"]` numbered from `first`.
    pub fn numbered_rows(mut self, first: u64, count: u64) -> Self {
        for i in first..first + count {
            self.rows.push(vec![i.to_string(), format!("name-{i}")]);
        }
        self
    }

    /// Style id of each data column (header cells use style 0).
    pub fn column_styles(mut self, styles: &[u32]) -> Self {
        self.styles = styles.to_vec();
        self
    }

    /// Raw `t` code of each data column; `""` writes no `t` attribute.
    ///
    /// Without this, numeric text is written untyped and anything else as a
    /// shared string.
    pub fn column_types(mut self, types: &[&str]) -> Self {
        self.types = Some(types.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn column_width(mut self, min: u32, max: u32, width: f64) -> Self {
        self.widths.push((min, max, width));
        self
    }

    pub fn sheet_entry(mut self, entry: &str) -> Self {
        self.sheet_entry = entry.to_string();
        self
    }

    pub fn sheet_name(mut self, name: &str) -> Self {
        self.sheet_name = name.to_string();
        self
    }

    pub fn without_workbook(mut self) -> Self {
        self.with_workbook = false;
        self
    }

    pub fn stored(mut self) -> Self {
        self.method = CompressionMethod::Stored;
        self
    }

    pub fn write(&self, path: &Path) {
        let mut strings: Vec<String> = Vec::new();
        let mut sheet = String::new();
        sheet.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        sheet.push_str(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#);
        if !self.widths.is_empty() {
            sheet.push_str("<cols>");
            for (min, max, width) in &self.widths {
                write!(sheet, r#"<col min="{min}" max="{max}" width="{width}" customWidth="1"/>"#).unwrap();
            }
            sheet.push_str("</cols>");
        }
        sheet.push_str("<sheetData>");

        sheet.push_str(r#"<row r="1">"#);
        for (i, text) in self.header.iter().enumerate() {
            let index = strings.len();
            strings.push(text.clone());
            write!(sheet, r#"<c r="{}" t="s"><v>{index}</v></c>"#, cell_name(i as u32 + 1, 1)).unwrap();
        }
        sheet.push_str("</row>");

        for (r, cells) in self.rows.iter().enumerate() {
            let row = r as u32 + 2;
            write!(sheet, r#"<row r="{row}">"#).unwrap();
            for (c, text) in cells.iter().enumerate() {
                if text.is_empty() {
                    continue;
                }
                let axis = cell_name(c as u32 + 1, row);
                let style = self.styles.get(c).copied().unwrap_or(0);
                let style_attr = if style == 0 { String::new() } else { format!(r#" s="{style}""#) };
                let code = match &self.types {
                    Some(types) => types.get(c).cloned().unwrap_or_default(),
                    None if text.parse::<f64>().is_ok() => String::new(),
                    None => "s".to_string(),
                };
                let written = match code.as_str() {
                    "" => write!(sheet, r#"<c r="{axis}"{style_attr}><v>{}</v></c>"#, escape_xml(text)),
                    "s" => {
                        let index = strings.len();
                        strings.push(text.clone());
                        write!(sheet, r#"<c r="{axis}"{style_attr} t="s"><v>{index}</v></c>"#)
                    },
                    "inlineStr" => write!(
                        sheet,
                        r#"<c r="{axis}"{style_attr} t="inlineStr"><is><t>{}</t></is></c>"#,
                        escape_xml(text)
                    ),
                    other => write!(
                        sheet,
                        r#"<c r="{axis}"{style_attr} t="{other}"><v>{}</v></c>"#,
                        escape_xml(text)
                    ),
                };
                written.unwrap();
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");

        let mut sst = String::new();
        write!(sst, r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#, strings.len()).unwrap();
        for s in &strings {
            write!(sst, "<si><t>{}</t></si>", escape_xml(s)).unwrap();
        }
        sst.push_str("</sst>");

        let mut parts = vec![
            (self.sheet_entry.clone(), sheet),
            ("xl/sharedStrings.xml".to_string(), sst),
            ("xl/styles.xml".to_string(), styles_xml()),
            ("xl/theme/theme1.xml".to_string(), THEME.to_string()),
        ];
        if self.with_workbook {
            let target = self
                .sheet_entry
                .strip_prefix("xl/")
                .unwrap_or(&self.sheet_entry)
                .to_string();
            parts.push((
                "xl/workbook.xml".to_string(),
                format!(
                    r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
                    escape_xml(&self.sheet_name)
                ),
            ));
            parts.push((
                "xl/_rels/workbook.xml.rels".to_string(),
                format!(
                    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="{target}"/></Relationships>"#
                ),
            ));
        }
        write_package(path, &parts, self.method);
    }

    /// Write a package whose only content is the given worksheet XML.
    pub fn write_raw_sheet(path: &Path, sheet_xml: &str) {
        let parts = vec![
            ("xl/worksheets/sheet1.xml".to_string(), sheet_xml.to_string()),
            ("xl/styles.xml".to_string(), styles_xml()),
        ];
        write_package(path, &parts, CompressionMethod::Deflated);
    }
}

fn write_package(path: &Path, parts: &[(String, String)], method: CompressionMethod) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(method);
    for (name, body) in parts {
        zip.start_file(name.as_str(), options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn styles_xml() -> String {
    let mut xml = String::from(
        r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Arial"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders>"#,
    );
    write!(xml, r#"<cellXfs count="{CELL_XFS}">"#).unwrap();
    for i in 0..CELL_XFS {
        write!(xml, r#"<xf numFmtId="{}" fontId="0" fillId="0" borderId="0"/>"#, i * 2).unwrap();
    }
    xml.push_str("</cellXfs></styleSheet>");
    xml
}

const THEME: &str = r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Fixture"/>"#;

/// Read every row of the primary sheet of `path`.
pub fn read_rows(path: &Path) -> Vec<Vec<String>> {
    crate::ooxml::RowStream::open(path)
        .unwrap()
        .collect::<crate::Result<Vec<_>>>()
        .unwrap()
}
