//! Input files of a job.

use std::path::{Path, PathBuf};

/// A source table: its path, byte size and, once counted, its data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Size on disk in bytes
    pub size: u64,
    /// Data rows (header excluded), filled in by the row estimator
    pub rows: Option<u64>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            rows: None,
        }
    }

    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
