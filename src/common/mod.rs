//! Common types and utilities shared by the container layer and the
//! transform engines.

pub mod bom;
pub mod error;
pub mod unit;
pub mod xml;

pub use error::{Error, Result};
