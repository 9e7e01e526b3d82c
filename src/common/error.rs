//! Error types for sheetflow.
//!
//! Every failure aborts the current job. Variants carry enough context (file,
//! cell, expected and actual values) to be shown to a user as they are.
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::transform::reconcile::SchemaMismatch;

/// Main error type for sheetflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error, annotated with the path being accessed
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container unreadable or an expected structural element is missing
    #[error("Invalid format: {0}")]
    Format(String),

    /// Merge sources disagree on column count or per-column style/type
    #[error("Schema mismatch: {0}")]
    Mismatch(SchemaMismatch),

    /// A cell's text cannot be coerced to its declared type
    #[error("{file}: cell {cell}, value {value:?} is not a valid {cell_type} value")]
    DataType {
        file: String,
        cell: String,
        value: String,
        cell_type: String,
    },

    /// Fewer data rows than requested split files
    #[error("Data row count ({rows}) is less than the requested file count ({files})")]
    Count { rows: u64, files: u64 },

    /// Target directory is occupied by files this job must not touch
    #[error("Cannot use {}: {reason}", path.display())]
    Conflict { path: PathBuf, reason: String },

    /// User-requested interruption
    #[error("Operation cancelled")]
    Cancelled,

    /// Job parameters rejected before any work started
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// An xlsx target would exceed the worksheet row limit
    #[error("{} would exceed the worksheet limit of {limit} rows", path.display())]
    RowLimit { path: PathBuf, limit: u32 },

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(String),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(String),
}

/// Result type for sheetflow operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error is the result of a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Zip(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Csv(err.to_string())
    }
}

/// Attach a path to IO failures.
pub(crate) trait IoResultExt<T> {
    fn at_path(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: &Path) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
