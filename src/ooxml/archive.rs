//! Read access to the ZIP container of an xlsx package.
//!
//! Small parts (workbook, relationships, styles) are read whole. Worksheet
//! entries can be far larger than memory allows, so [`Archive::entry`] hands
//! out an owned reader that inflates the entry straight from the file.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::DeflateDecoder;
use zip::{CompressionMethod, ZipArchive};

use crate::common::error::IoResultExt;
use crate::common::{Error, Result};

/// Local file header signature (`PK\x03\x04`).
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
/// Fixed part of a local file header.
const LOCAL_HEADER_LEN: u64 = 30;

const ENTRY_BUFFER_SIZE: usize = 64 * 1024;

/// Owned streaming reader over one archive entry.
pub type EntryReader = Box<dyn Read + Send>;

/// An opened xlsx (ZIP) container.
pub struct Archive {
    path: PathBuf,
    zip: ZipArchive<BufReader<File>>,
}

impl Archive {
    /// Open the container at `path`, reading its central directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).at_path(path)?;
        let zip = ZipArchive::new(BufReader::new(file))
            .map_err(|e| Error::Format(format!("{} is not a valid xlsx archive: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            zip,
        })
    }

    /// Path the archive was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an entry with this exact name exists.
    pub fn has_entry(&self, name: &str) -> bool {
        self.zip.index_for_name(name).is_some()
    }

    /// Read a whole entry into memory. `Ok(None)` if the entry does not exist.
    pub fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut file = match self.zip.by_name(name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes).at_path(&self.path)?;
        Ok(Some(bytes))
    }

    /// Open a streaming reader over one entry.
    ///
    /// The reader owns its own file handle, positioned at the entry's data, so
    /// it outlives any borrow of the archive.
    pub fn entry(&mut self, name: &str) -> Result<EntryReader> {
        let (header_start, compressed_size, method) = {
            let file = match self.zip.by_name(name) {
                Ok(file) => file,
                Err(zip::result::ZipError::FileNotFound) => {
                    return Err(Error::Format(format!(
                        "{}: missing archive entry {name}",
                        self.path.display()
                    )));
                },
                Err(e) => return Err(e.into()),
            };
            if file.encrypted() {
                return Err(Error::Format(format!(
                    "{}: entry {name} is encrypted",
                    self.path.display()
                )));
            }
            (file.header_start(), file.compressed_size(), file.compression())
        };

        let mut raw = File::open(&self.path).at_path(&self.path)?;
        let data_start = local_data_start(&mut raw, header_start)
            .at_path(&self.path)?
            .ok_or_else(|| {
                Error::Format(format!(
                    "{}: corrupt local header for {name}",
                    self.path.display()
                ))
            })?;
        raw.seek(SeekFrom::Start(data_start)).at_path(&self.path)?;
        let limited = BufReader::with_capacity(ENTRY_BUFFER_SIZE, raw).take(compressed_size);

        match method {
            CompressionMethod::Stored => Ok(Box::new(limited)),
            CompressionMethod::Deflated => Ok(Box::new(DeflateDecoder::new(limited))),
            other => Err(Error::Format(format!(
                "{}: entry {name} uses unsupported compression {other:?}",
                self.path.display()
            ))),
        }
    }
}

/// Offset of the entry data that follows the local header at `header_start`.
fn local_data_start(file: &mut File, header_start: u64) -> std::io::Result<Option<u64>> {
    let mut header = [0u8; LOCAL_HEADER_LEN as usize];
    file.seek(SeekFrom::Start(header_start))?;
    file.read_exact(&mut header)?;
    let signature = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if signature != LOCAL_HEADER_SIGNATURE {
        return Ok(None);
    }
    let name_len = u16::from_le_bytes([header[26], header[27]]) as u64;
    let extra_len = u16::from_le_bytes([header[28], header[29]]) as u64;
    Ok(Some(header_start + LOCAL_HEADER_LEN + name_len + extra_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SheetFixture;

    #[test]
    fn test_entry_streams_deflated_part() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xlsx");
        SheetFixture::new(&["id", "name"]).row(&["1", "alpha"]).write(&path);

        let mut archive = Archive::open(&path).unwrap();
        assert!(archive.has_entry("xl/worksheets/sheet1.xml"));
        assert!(!archive.has_entry("xl/worksheets/sheet9.xml"));

        let mut streamed = String::new();
        archive
            .entry("xl/worksheets/sheet1.xml")
            .unwrap()
            .read_to_string(&mut streamed)
            .unwrap();
        let whole = archive.read_bytes("xl/worksheets/sheet1.xml").unwrap().unwrap();
        assert_eq!(streamed.as_bytes(), whole.as_slice());
        assert!(streamed.contains("<sheetData>"));
    }

    #[test]
    fn test_stored_entry_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stored.xlsx");
        SheetFixture::new(&["h"]).row(&["v"]).stored().write(&path);

        let mut archive = Archive::open(&path).unwrap();
        let mut text = String::new();
        archive
            .entry("xl/worksheets/sheet1.xml")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.ends_with("</worksheet>"));
    }

    #[test]
    fn test_missing_entry_and_bad_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xlsx");
        SheetFixture::new(&["id"]).write(&path);

        let mut archive = Archive::open(&path).unwrap();
        assert!(matches!(archive.entry("nope.xml"), Err(Error::Format(_))));
        assert!(archive.read_bytes("nope.xml").unwrap().is_none());

        let junk = dir.path().join("junk.xlsx");
        std::fs::write(&junk, b"not a zip at all").unwrap();
        assert!(matches!(Archive::open(&junk), Err(Error::Format(_))));
        assert!(matches!(
            Archive::open(dir.path().join("missing.xlsx")),
            Err(Error::Io { .. })
        ));
    }
}
