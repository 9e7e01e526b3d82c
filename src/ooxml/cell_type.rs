//! Cell type codes (`t` attribute of `<c>`).

use std::fmt;

/// Declared type of a worksheet cell.
///
/// The mapping to the raw `t` attribute is closed: every code the format
/// defines has a variant, anything else is kept verbatim in `Unsupported`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellType {
    /// `n`
    Number,
    /// No `t` attribute
    Unset,
    /// `inlineStr`
    InlineString,
    /// `s`
    SharedString,
    /// `b`
    Bool,
    /// `d`
    Date,
    /// `e`
    Error,
    /// `str`, a cached formula string result
    Formula,
    /// Any other raw code
    Unsupported(String),
}

impl CellType {
    /// Translate a raw `t` attribute value. `None` means the attribute is absent.
    pub fn from_raw(raw: Option<&[u8]>) -> Self {
        match raw {
            None => CellType::Unset,
            Some(b"n") => CellType::Number,
            Some(b"s") => CellType::SharedString,
            Some(b"inlineStr") => CellType::InlineString,
            Some(b"str") => CellType::Formula,
            Some(b"e") => CellType::Error,
            Some(b"d") => CellType::Date,
            Some(b"b") => CellType::Bool,
            Some(other) => CellType::Unsupported(String::from_utf8_lossy(other).into_owned()),
        }
    }

    /// Raw `t` attribute value, `None` for [`CellType::Unset`].
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            CellType::Unset => None,
            CellType::Number => Some("n"),
            CellType::SharedString => Some("s"),
            CellType::InlineString => Some("inlineStr"),
            CellType::Formula => Some("str"),
            CellType::Error => Some("e"),
            CellType::Date => Some("d"),
            CellType::Bool => Some("b"),
            CellType::Unsupported(raw) => Some(raw),
        }
    }

    /// Whether values of this type are carried with full fidelity.
    ///
    /// Everything else is copied on a best-effort basis.
    #[inline]
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            CellType::Number | CellType::Unset | CellType::InlineString | CellType::SharedString
        )
    }

    /// Whether cells of this type hold numeric text.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, CellType::Number | CellType::Unset)
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellType::Number => f.write_str("number"),
            CellType::Unset => f.write_str("unset"),
            CellType::InlineString => f.write_str("inline string"),
            CellType::SharedString => f.write_str("shared string"),
            CellType::Bool => f.write_str("bool"),
            CellType::Date => f.write_str("date"),
            CellType::Error => f.write_str("error"),
            CellType::Formula => f.write_str("formula string"),
            CellType::Unsupported(raw) => write!(f, "unsupported type {raw:?}"),
        }
    }
}
