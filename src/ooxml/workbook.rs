//! Locating the primary worksheet of a workbook.
//!
//! The first `<sheet>` of `xl/workbook.xml` is resolved through
//! `xl/_rels/workbook.xml.rels`. Packages written by tools that skip the
//! relationship part still work through the conventional fallback location.

use quick_xml::Reader;
use quick_xml::events::Event;

use super::archive::Archive;
use crate::common::{Error, Result};

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const FALLBACK_SHEET_PART: &str = "xl/worksheets/sheet1.xml";

/// Where the primary worksheet lives inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLocation {
    /// Display name of the sheet, if the workbook part declares one
    pub name: Option<String>,
    /// Archive entry name of the worksheet XML
    pub entry: String,
}

/// Resolve the primary worksheet entry of `archive`.
pub fn locate_primary_sheet(archive: &mut Archive) -> Result<SheetLocation> {
    let declared = match archive.read_bytes(WORKBOOK_PART)? {
        Some(bytes) => first_sheet(&bytes)?,
        None => None,
    };

    let mut name = None;
    if let Some((sheet_name, rel_id)) = declared {
        name = Some(sheet_name);
        if let Some(rels) = archive.read_bytes(WORKBOOK_RELS_PART)?
            && let Some(target) = relationship_target(&rels, &rel_id)?
        {
            let entry = resolve_target(&target);
            if archive.has_entry(&entry) {
                return Ok(SheetLocation { name, entry });
            }
            tracing::debug!(entry = %entry, "declared worksheet entry missing, using fallback");
        }
    }

    if archive.has_entry(FALLBACK_SHEET_PART) {
        return Ok(SheetLocation {
            name,
            entry: FALLBACK_SHEET_PART.to_string(),
        });
    }

    Err(Error::Format(format!(
        "{}: no worksheet found",
        archive.path().display()
    )))
}

/// Name and relationship id of the first `<sheet>` in workbook.xml.
fn first_sheet(xml: &[u8]) -> Result<Option<(String, String)>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(512);

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let mut name = String::new();
                let mut rel_id = None;
                for attr in e.attributes().flatten() {
                    match attr.key.local_name().as_ref() {
                        b"name" => {
                            name = attr
                                .decode_and_unescape_value(reader.decoder())
                                .map_err(|e| Error::Xml(e.to_string()))?
                                .into_owned();
                        },
                        b"id" => {
                            rel_id = Some(
                                attr.decode_and_unescape_value(reader.decoder())
                                    .map_err(|e| Error::Xml(e.to_string()))?
                                    .into_owned(),
                            );
                        },
                        _ => {},
                    }
                }
                return Ok(rel_id.map(|id| (name, id)));
            },
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(Error::Xml(format!("workbook.xml: {e}"))),
            _ => {},
        }
    }
}

/// Target of the relationship with id `rel_id`.
fn relationship_target(xml: &[u8], rel_id: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(512);

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id_matches = false;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.local_name().as_ref() {
                        b"Id" => id_matches = attr.value.as_ref() == rel_id.as_bytes(),
                        b"Target" => {
                            target = Some(
                                attr.decode_and_unescape_value(reader.decoder())
                                    .map_err(|e| Error::Xml(e.to_string()))?
                                    .into_owned(),
                            );
                        },
                        _ => {},
                    }
                }
                if id_matches {
                    return Ok(target);
                }
            },
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(Error::Xml(format!("workbook.xml.rels: {e}"))),
            _ => {},
        }
    }
}

/// Turn a relationship target into an archive entry name.
///
/// Targets are relative to `xl/` unless they start with `/`.
fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = vec!["xl"];
    for segment in target.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                parts.pop();
            },
            other => parts.push(other),
        }
    }
    parts.join("/")
}
