//! Bounded-memory merge and split of spreadsheet tables.
//!
//! Both engines read one row at a time from [`RowStream`](crate::ooxml::RowStream)s
//! and write through a [`target::RowSink`], owning at most one open target at
//! a time. Jobs poll a [`CancelGate`] before every row and report to a
//! [`ProgressSink`].

pub mod cancel;
pub mod estimate;
pub mod merge;
pub mod options;
pub mod partition;
pub mod progress;
pub mod reconcile;
pub mod source;
pub mod split;
pub mod split_dir;
pub mod target;

pub use cancel::CancelGate;
pub use estimate::{RowCount, count_rows, estimate_rows, fill_row_counts, stat_sources};
pub use merge::{MergeJob, MergeSummary, merge};
pub use options::{DEFAULT_PROGRESS_EVERY, DEFAULT_SHEET_NAME, TargetFormat, TransformOptions};
pub use partition::{PartitionMode, PartitionPlan};
pub use progress::{NoProgress, ProgressEvent, ProgressScope, ProgressSink, ProgressStage};
pub use reconcile::{ReconciledSchema, SchemaMismatch, UnsupportedColumn, reconcile};
pub use source::SourceFile;
pub use split::{SplitJob, SplitSummary, split};
