//! UTF-8 Byte Order Mark helpers for delimited-text targets.
//!
//! Spreadsheet applications use the BOM to recognise a CSV file as UTF-8, so
//! csv targets are prefixed with one unless the caller opts out.

use std::io::Write;

/// UTF-8 BOM bytes.
pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Writes the UTF-8 BOM to the writer.
#[inline]
pub fn write_utf8_bom<W: Write>(writer: &mut W) -> std::io::Result<()> {
    writer.write_all(&UTF8_BOM)
}

/// Returns `bytes` without a leading UTF-8 BOM.
#[cfg(test)]
pub(crate) fn strip_utf8_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&UTF8_BOM[..]).unwrap_or(bytes)
}
