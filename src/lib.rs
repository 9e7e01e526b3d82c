//! Sheetflow - streaming merge and split of large spreadsheet tables
//!
//! This library combines several `.xlsx` tables into one, or partitions one
//! into many, while holding no more than a row at a time in memory.
//!
//! # Features
//!
//! - **Merge**: N sources with the same column schema into one xlsx or csv target
//! - **Split**: one source into files of at most `n` rows, or into `k` files of `ceil(rows / k)` rows
//! - **Schema checks**: per-column style and type probed from the first data row
//!   and cross-checked before anything is written
//! - **Streaming I/O**: worksheets are read and written straight through the ZIP
//!   container, never materialized
//! - **Progress and cancellation**: row-granular checkpoints with ETA estimates
//!
//! # Example - Merging two workbooks
//!
//! ```no_run
//! use sheetflow::transform::{CancelGate, MergeJob, NoProgress, TransformOptions, merge, stat_sources};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sources = stat_sources(&["jan.xlsx".into(), "feb.xlsx".into()])?;
//! let job = MergeJob::new(sources, "q1.xlsx");
//! let summary = merge(&job, &TransformOptions::default(), &mut NoProgress, &CancelGate::new())?;
//! println!("{} rows in {:?}", summary.total_data_rows, summary.elapsed);
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Splitting into files of 50,000 rows
//!
//! ```no_run
//! use sheetflow::transform::{
//!     CancelGate, PartitionMode, ProgressEvent, SourceFile, SplitJob, TransformOptions, split,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = SplitJob::new(SourceFile::new("sales.xlsx", 0), PartitionMode::ByLineCount(50_000));
//! let mut report = |e: &ProgressEvent| println!("{} rows, eta {:?}", e.rows_processed, e.eta);
//! let summary = split(&job, &TransformOptions::default(), &mut report, &CancelGate::new())?;
//! for (path, rows) in &summary.files {
//!     println!("{}: {rows}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

/// Error type, byte-order marks, human-readable units and XML escaping
pub mod common;

/// Job-scoped diagnostic log files
pub mod logging;

/// Streaming access to the primary worksheet of `.xlsx` packages
///
/// Reading rows, probing column schemas and writing new packages.
pub mod ooxml;

/// Merge and split engines with their configuration, progress and cancellation
pub mod transform;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use common::{Error, Result};
pub use transform::{
    CancelGate, MergeJob, MergeSummary, PartitionMode, SourceFile, SplitJob, SplitSummary,
    TargetFormat, TransformOptions, merge, split,
};
