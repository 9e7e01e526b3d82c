//! Shared strings table (`xl/sharedStrings.xml`).
//!
//! Cells typed `s` store an index into this table. Plain `<si><t>` items and
//! rich-text runs (`<si><r><t>`) are flattened to their text; phonetic hints
//! (`<rPh>`) are skipped.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::Event;

use super::archive::Archive;
use crate::common::xml::resolve_entity;
use crate::common::{Error, Result};

pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Index -> text table of a workbook.
#[derive(Debug, Default, Clone)]
pub struct SharedStrings {
    strings: Vec<String>,
}

impl SharedStrings {
    /// Load the table from `archive`; empty when the part is absent.
    pub fn load(archive: &mut Archive) -> Result<Self> {
        if !archive.has_entry(SHARED_STRINGS_PART) {
            return Ok(Self::default());
        }
        let entry = archive.entry(SHARED_STRINGS_PART)?;
        Self::parse(std::io::BufReader::new(entry))
    }

    /// Parse a shared strings part from any buffered reader.
    pub fn parse<R: BufRead>(source: R) -> Result<Self> {
        let mut reader = Reader::from_reader(source);
        let mut buf = Vec::with_capacity(1024);
        let mut strings = Vec::new();

        let mut current = String::new();
        let mut in_item = false;
        let mut in_text = false;
        let mut phonetic_depth = 0u32;

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"si" => {
                        in_item = true;
                        current.clear();
                    },
                    b"rPh" => phonetic_depth += 1,
                    b"t" => in_text = in_item && phonetic_depth == 0,
                    _ => {},
                },
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                    strings.push(String::new());
                },
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"si" => {
                        strings.push(std::mem::take(&mut current));
                        in_item = false;
                    },
                    b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                    b"t" => in_text = false,
                    _ => {},
                },
                Ok(Event::Text(t)) if in_text => current.push_str(&String::from_utf8_lossy(&t)),
                Ok(Event::CData(t)) if in_text => current.push_str(&String::from_utf8_lossy(&t)),
                Ok(Event::GeneralRef(r)) if in_text => {
                    let name = String::from_utf8_lossy(&r);
                    match resolve_entity(&name) {
                        Some(c) => current.push(c),
                        None => {
                            current.push('&');
                            current.push_str(&name);
                            current.push(';');
                        },
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::Xml(format!("sharedStrings.xml: {e}"))),
                _ => {},
            }
        }

        tracing::debug!(count = strings.len(), "loaded shared strings");
        Ok(Self { strings })
    }

    /// Get a string by its index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    /// Resolve the raw `<v>` text of a shared-string cell.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        let index: usize = atoi_simd::parse(raw.trim().as_bytes()).ok()?;
        self.get(index)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
