//! Office Open XML spreadsheet container layer.
//!
//! A thin, streaming view of `.xlsx` packages: only what the transform engines
//! need to read the primary worksheet row by row and write a new package with
//! the same styles.
//!
//! # Architecture
//!
//! 1. **Package access** (`archive`, `workbook`): ZIP entries and the primary
//!    sheet location
//! 2. **Reading** (`shared_strings`, `rows`, `schema`): cell text and the
//!    per-column style/type signature of the first data row
//! 3. **Writing** (`writer`): a sheet streamed straight into a deflated entry
//!
//! # Example
//!
//! ```rust,no_run
//! use sheetflow::ooxml::rows::RowStream;
//!
//! let mut rows = RowStream::open("input.xlsx")?;
//! let header = rows.header()?;
//! while let Some(row) = rows.next_row()? {
//!     println!("{} cells", row.len());
//! }
//! # Ok::<(), sheetflow::Error>(())
//! ```
use quick_xml::events::BytesStart;

pub mod archive;
pub mod cell_type;
pub mod reference;
pub mod rows;
pub mod schema;
pub mod shared_strings;
pub mod workbook;
pub mod writer;

pub use archive::Archive;
pub use cell_type::CellType;
pub use rows::RowStream;
pub use schema::{ColumnLayout, ColumnMeta, ColumnSpec, SchemaSignature, probe};
pub use writer::{CellValue, StyledCell, XlsxStreamWriter, XlsxTemplate};

/// Attributes of a `<c>` element that the readers care about.
#[derive(Debug, Default)]
pub(crate) struct CellAttrs {
    /// Column from the `r` axis, if present and valid
    pub column: Option<u32>,
    /// `s` attribute, 0 when absent
    pub style: u32,
    /// Raw `t` attribute
    pub raw_type: Option<Vec<u8>>,
}

impl CellAttrs {
    pub fn read(e: &BytesStart<'_>) -> Self {
        let mut attrs = CellAttrs::default();
        for attr in e.attributes().flatten() {
            match attr.key.local_name().as_ref() {
                b"r" => attrs.column = reference::axis_column(&attr.value),
                b"s" => attrs.style = atoi_simd::parse(&attr.value).unwrap_or(0),
                b"t" => attrs.raw_type = Some(attr.value.to_vec()),
                _ => {},
            }
        }
        attrs
    }
}

/// `r` attribute of a `<row>` element.
pub(crate) fn row_number(e: &BytesStart<'_>) -> Option<u32> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"r")
        .and_then(|attr| atoi_simd::parse(&attr.value).ok())
}
