//! Partitioning of a row sequence into split output files.

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// How a split distributes data rows over output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionMode {
    /// At most `n` data rows per file
    ByLineCount(u64),
    /// `ceil(rows / k)` data rows per file, so at most `k` files
    ByFileCount(u64),
}

impl PartitionMode {
    pub(crate) fn validate(self) -> Result<()> {
        match self {
            PartitionMode::ByLineCount(0) => {
                Err(Error::InvalidJob("line count per file must be at least 1".to_string()))
            },
            PartitionMode::ByFileCount(0) => {
                Err(Error::InvalidJob("file count must be at least 1".to_string()))
            },
            _ => Ok(()),
        }
    }

    pub fn needs_row_count(self) -> bool {
        matches!(self, PartitionMode::ByFileCount(_))
    }
}

/// Row ranges of every output file.
///
/// Both modes cut the stream every `per_file` rows. The row count only feeds
/// the per-file size of [`PartitionMode::ByFileCount`] and the expected file
/// count; a count that disagrees with the stream never makes a file larger
/// than `per_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    per_file: u64,
    total: Option<u64>,
    width: usize,
}

impl PartitionPlan {
    /// Build the plan for `mode`. `total` is the number of data rows, which
    /// [`PartitionMode::ByFileCount`] requires.
    pub fn new(mode: PartitionMode, total: Option<u64>) -> Result<Self> {
        mode.validate()?;
        match mode {
            PartitionMode::ByLineCount(per_file) => Ok(PartitionPlan {
                per_file,
                total,
                width: 0,
            }),
            PartitionMode::ByFileCount(files) => {
                let total = total.ok_or_else(|| {
                    Error::InvalidJob("splitting by file count needs the row count".to_string())
                })?;
                if total < files {
                    return Err(Error::Count { rows: total, files });
                }
                Ok(PartitionPlan {
                    per_file: total.div_ceil(files),
                    total: Some(total),
                    width: digits(files),
                })
            },
        }
    }

    /// Maximum data rows per file.
    pub fn per_file(&self) -> u64 {
        self.per_file
    }

    /// Expected number of output files, when the row count is known.
    pub fn file_count(&self) -> Option<u64> {
        self.total.map(|t| t.div_ceil(self.per_file))
    }

    /// Zero-padding width of file indices in output names.
    pub fn index_width(&self) -> usize {
        self.width
    }

    /// Expected data rows in file `file` (0-based), when the row count is known.
    pub fn rows_in(&self, file: u64) -> Option<u64> {
        let start = file.saturating_mul(self.per_file);
        self.total
            .and_then(|t| (start < t).then(|| (t - start).min(self.per_file)))
    }

    pub fn cursor(self) -> PartitionCursor {
        PartitionCursor {
            per_file: self.per_file,
        }
    }
}

/// Walks a plan row by row, reporting where each new file starts.
#[derive(Debug, Clone)]
pub struct PartitionCursor {
    per_file: u64,
}

impl PartitionCursor {
    /// Call once per data row with its 0-based index. Returns the 1-based
    /// index of the file that starts at this row, if any.
    pub fn starts_file(&mut self, row: u64) -> Option<u64> {
        (row % self.per_file == 0).then(|| row / self.per_file + 1)
    }
}

fn digits(mut n: u64) -> usize {
    let mut width = 1;
    while n >= 10 {
        n /= 10;
        width += 1;
    }
    width
}
