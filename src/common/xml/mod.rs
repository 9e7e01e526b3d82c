//! XML text helpers shared by the worksheet readers and the sheet writer.

mod escape;

pub use escape::{escape_xml, resolve_entity};
