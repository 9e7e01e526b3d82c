//! Forward-only row cursor over the primary worksheet of a workbook.
//!
//! The worksheet entry is inflated and parsed as it is read; at most one
//! parsed row is held back (when the next physical row is further ahead than
//! the row being reported), so memory use does not grow with sheet size.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;

use super::archive::{Archive, EntryReader};
use super::cell_type::CellType;
use super::reference::{MAX_ROWS, cell_name};
use super::shared_strings::SharedStrings;
use super::workbook::locate_primary_sheet;
use super::{CellAttrs, row_number};
use crate::common::xml::resolve_entity;
use crate::common::{Error, Result};

const ROW_BUFFER_SIZE: usize = 16 * 1024;

/// Which text node of a cell is being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    None,
    Value,
    Inline,
}

/// Cell currently being parsed.
struct OpenCell {
    column: u32,
    cell_type: CellType,
    value: String,
    inline: String,
    has_inline: bool,
}

/// A lazy, forward-only sequence of rows of text cells.
///
/// The first row returned is physical row 1 (the header). Gaps in the
/// physical row numbering come back as empty rows; gaps between cells come
/// back as empty strings; trailing empty cells are dropped.
pub struct RowStream {
    path: PathBuf,
    reader: Option<Reader<BufReader<EntryReader>>>,
    strings: SharedStrings,
    buf: Vec<u8>,
    pending: Option<(u32, Vec<String>)>,
    /// Physical number of the last row handed out
    last_row: u32,
    /// Physical number of the last `<row>` parsed
    last_parsed: u32,
}

impl RowStream {
    /// Open the primary worksheet of the workbook at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut archive = Archive::open(path)?;
        let sheet = locate_primary_sheet(&mut archive)?;
        let strings = SharedStrings::load(&mut archive)?;
        let entry = archive.entry(&sheet.entry)?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(Reader::from_reader(BufReader::with_capacity(ROW_BUFFER_SIZE, entry))),
            strings,
            buf: Vec::with_capacity(ROW_BUFFER_SIZE),
            pending: None,
            last_row: 0,
            last_parsed: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume the header (physical row 1).
    ///
    /// `Ok(None)` if the sheet has no rows at all. Must be called before any
    /// other row is read.
    pub fn header(&mut self) -> Result<Option<Vec<String>>> {
        if self.last_row != 0 {
            return Err(Error::InvalidJob(format!(
                "{}: header requested after row {} was read",
                self.path.display(),
                self.last_row
            )));
        }
        self.next_row()
    }

    /// Physical row number of the last row returned (0 before the first).
    #[inline]
    pub fn row_number(&self) -> u32 {
        self.last_row
    }

    /// Next row, or `Ok(None)` at the end of the sheet.
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        let (number, cells) = match self.pending.take() {
            Some(row) => row,
            None => match self.read_physical_row()? {
                Some(row) => row,
                None => {
                    self.close();
                    return Ok(None);
                },
            },
        };

        let expected = self.last_row.saturating_add(1);
        self.last_row = expected;
        if number > expected {
            self.pending = Some((number, cells));
            return Ok(Some(Vec::new()));
        }
        Ok(Some(cells))
    }

    /// Release the worksheet handle. Safe to call more than once.
    pub fn close(&mut self) {
        self.reader = None;
        self.pending = None;
    }

    /// Parse the next `<row>` element into `(physical number, cells)`.
    fn read_physical_row(&mut self) -> Result<Option<(u32, Vec<String>)>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut row: Option<(u32, Vec<String>)> = None;
        let mut cell: Option<OpenCell> = None;
        let mut target = TextTarget::None;
        let mut next_col = 1u32;
        let mut phonetic_depth = 0u32;

        loop {
            self.buf.clear();
            let event = reader
                .read_event_into(&mut self.buf)
                .map_err(|e| Error::Xml(format!("{}: {e}", self.path.display())))?;

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match e.local_name().as_ref() {
                        b"row" => {
                            let number = row_number(e)
                                .filter(|&n| n > self.last_parsed)
                                .unwrap_or(self.last_parsed.saturating_add(1));
                            if number > MAX_ROWS {
                                return Err(Error::Format(format!(
                                    "{}: row {number} is beyond the last worksheet row {MAX_ROWS}",
                                    self.path.display()
                                )));
                            }
                            self.last_parsed = number;
                            next_col = 1;
                            if is_empty {
                                return Ok(Some((number, Vec::new())));
                            }
                            row = Some((number, Vec::new()));
                        },
                        b"c" if row.is_some() => {
                            let attrs = CellAttrs::read(e);
                            let column = attrs.column.unwrap_or(next_col);
                            next_col = column + 1;
                            if !is_empty {
                                cell = Some(OpenCell {
                                    column,
                                    cell_type: CellType::from_raw(attrs.raw_type.as_deref()),
                                    value: String::new(),
                                    inline: String::new(),
                                    has_inline: false,
                                });
                            }
                        },
                        b"v" if cell.is_some() && !is_empty => target = TextTarget::Value,
                        b"is" => {
                            if let Some(open) = cell.as_mut() {
                                open.has_inline = true;
                            }
                        },
                        b"t" if cell.is_some() && !is_empty && phonetic_depth == 0 => {
                            target = TextTarget::Inline;
                        },
                        b"rPh" if !is_empty => phonetic_depth += 1,
                        _ => {},
                    }
                },
                Event::Text(ref t) => push_text(&mut cell, target, &String::from_utf8_lossy(t)),
                Event::CData(ref t) => push_text(&mut cell, target, &String::from_utf8_lossy(t)),
                Event::GeneralRef(ref r) => {
                    let name = String::from_utf8_lossy(r);
                    match resolve_entity(&name) {
                        Some(c) => push_text(&mut cell, target, c.encode_utf8(&mut [0u8; 4])),
                        None => push_text(&mut cell, target, &format!("&{name};")),
                    }
                },
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"v" | b"t" => target = TextTarget::None,
                    b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                    b"c" => {
                        if let (Some(open), Some((number, cells))) = (cell.take(), row.as_mut()) {
                            let text = cell_text(&self.strings, &self.path, *number, open)?;
                            place(cells, text.0, text.1);
                        }
                        target = TextTarget::None;
                    },
                    b"row" => {
                        if let Some((number, mut cells)) = row.take() {
                            while cells.last().is_some_and(String::is_empty) {
                                cells.pop();
                            }
                            return Ok(Some((number, cells)));
                        }
                    },
                    b"sheetData" => break,
                    _ => {},
                },
                Event::Eof => break,
                _ => {},
            }
        }

        self.reader = None;
        Ok(None)
    }
}

fn push_text(cell: &mut Option<OpenCell>, target: TextTarget, text: &str) {
    let Some(open) = cell.as_mut() else {
        return;
    };
    match target {
        TextTarget::Value => open.value.push_str(text),
        TextTarget::Inline => open.inline.push_str(text),
        TextTarget::None => {},
    }
}

/// Final text of a closed cell: shared strings and inline strings resolved,
/// everything else the raw `<v>` text.
fn cell_text(strings: &SharedStrings, path: &Path, row: u32, cell: OpenCell) -> Result<(u32, String)> {
    let text = match cell.cell_type {
        CellType::SharedString if !cell.value.is_empty() => match strings.resolve(&cell.value) {
            Some(s) => s.to_string(),
            None => {
                return Err(Error::Format(format!(
                    "{}: cell {} refers to missing shared string {:?}",
                    path.display(),
                    cell_name(cell.column, row),
                    cell.value
                )));
            },
        },
        _ if cell.has_inline => cell.inline,
        _ => cell.value,
    };
    Ok((cell.column, text))
}

/// Put `text` at 1-based `column`, filling any gap with empty strings.
fn place(cells: &mut Vec<String>, column: u32, text: String) {
    let index = column.saturating_sub(1) as usize;
    if index < cells.len() {
        cells[index] = text;
    } else {
        cells.resize(index, String::new());
        cells.push(text);
    }
}

impl Iterator for RowStream {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("path", &self.path)
            .field("row", &self.last_row)
            .field("open", &self.reader.is_some())
            .finish()
    }
}
