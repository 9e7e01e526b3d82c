//! A1-style cell references.
//!
//! Columns are 1-based (`A` = 1, `Z` = 26, `AA` = 27); rows are 1-based.

/// Highest row number a worksheet may contain.
pub const MAX_ROWS: u32 = 1_048_576;

/// Highest column number a worksheet may contain (`XFD`).
pub const MAX_COLUMNS: u32 = 16_384;

/// Convert a column number to its letters (e.g., 1 -> "A", 27 -> "AA").
///
/// Returns an empty string for column 0.
pub fn column_to_letters(col: u32) -> String {
    let mut buf = [0u8; 7];
    let mut pos = buf.len();
    let mut col = col;

    while col > 0 {
        col -= 1;
        pos -= 1;
        buf[pos] = (col % 26) as u8 + b'A';
        col /= 26;
    }

    String::from_utf8_lossy(&buf[pos..]).into_owned()
}

/// Convert column letters (any case) to a column number.
///
/// Returns `None` for empty input, non-letters, or columns beyond `XFD`.
pub fn letters_to_column(letters: &[u8]) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col = 0u32;
    for &byte in letters {
        if !byte.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (byte.to_ascii_uppercase() - b'A' + 1) as u32;
    }
    (col <= MAX_COLUMNS).then_some(col)
}

/// Split an axis such as `"AB12"` into `(column, row)`, here `(28, 12)`.
pub fn parse_axis(axis: &[u8]) -> Option<(u32, u32)> {
    let split = axis.iter().position(|b| b.is_ascii_digit())?;
    let col = letters_to_column(&axis[..split])?;
    let row: u32 = atoi_simd::parse(&axis[split..]).ok()?;
    (row >= 1).then_some((col, row))
}

/// Column number of an axis, ignoring the row part.
///
/// Used where only the column matters and rows are numbered separately.
pub fn axis_column(axis: &[u8]) -> Option<u32> {
    let end = axis
        .iter()
        .position(|b| !b.is_ascii_alphabetic())
        .unwrap_or(axis.len());
    letters_to_column(&axis[..end])
}

/// Build an axis from `(column, row)`, e.g. `(3, 7)` -> `"C7"`.
pub fn cell_name(col: u32, row: u32) -> String {
    let mut name = column_to_letters(col);
    name.push_str(itoa::Buffer::new().format(row));
    name
}
