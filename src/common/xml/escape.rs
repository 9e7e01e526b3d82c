use std::borrow::Cow;

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

// Built once on first use; patterns are fixed literals.
static XML_ESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(["&", "<", ">", "\"", "'"])
        .expect("Failed to build XML escaper")
});

const XML_ENTITIES: [&str; 5] = ["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"];

/// Whether `c` may appear in an XML 1.0 document.
#[inline]
fn is_xml_char(c: char) -> bool {
    matches!(c, '\u{9}' | '\u{A}' | '\u{D}' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

/// Escape XML special characters and drop characters XML 1.0 cannot carry.
///
/// Cell text coming out of a source workbook is already valid, but text from
/// CSV-ish sources or malformed files may contain raw control characters that
/// would make the written sheet unreadable.
///
/// # Examples
///
/// ```
/// use sheetflow::common::xml::escape_xml;
/// assert_eq!(escape_xml("a & b"), "a &amp; b");
/// assert_eq!(escape_xml("<x>\"y\"</x>"), "&lt;x&gt;&quot;y&quot;&lt;/x&gt;");
/// assert_eq!(escape_xml("bell\u{7}"), "bell");
/// ```
#[inline]
pub fn escape_xml(s: &str) -> String {
    let cleaned: Cow<'_, str> = if s.chars().all(is_xml_char) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.chars().filter(|&c| is_xml_char(c)).collect())
    };
    XML_ESCAPER.replace_all(&cleaned, &XML_ENTITIES)
}

/// Resolve the body of an entity reference (`amp`, `#38`, `#x26`, ...).
///
/// quick-xml reports references inside text as separate events, so readers
/// stitch the text back together with this. Unknown names yield `None`.
pub fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        },
    }
}
