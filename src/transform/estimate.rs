//! Byte sizes and exact row counts of sources.
//!
//! Counting rows means reading a whole worksheet, so several sources are
//! counted at once on the rayon pool, one task per source.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::cancel::CancelGate;
use super::source::SourceFile;
use crate::common::error::IoResultExt;
use crate::common::unit::{format_duration, format_size};
use crate::common::{Error, Result};
use crate::ooxml::rows::RowStream;

/// Outcome of counting one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCount {
    pub path: PathBuf,
    /// Data rows, header excluded
    pub rows: u64,
    pub elapsed: Duration,
}

/// Build [`SourceFile`]s carrying each path's byte size.
pub fn stat_sources(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    paths
        .iter()
        .map(|path| {
            let size = std::fs::metadata(path).at_path(path)?.len();
            tracing::debug!(source = %path.display(), size = %format_size(size), "sized source");
            Ok(SourceFile::new(path.clone(), size))
        })
        .collect()
}

/// Count the data rows of one source by reading it to the end.
///
/// `cancel` is polled before every row; a cancelled count returns
/// [`Error::Cancelled`].
pub fn count_rows(path: &Path, cancel: &CancelGate) -> Result<u64> {
    let mut stream = RowStream::open(path)?;
    if stream.header()?.is_none() {
        return Ok(0);
    }
    let mut rows = 0u64;
    loop {
        cancel.check()?;
        if stream.next_row()?.is_none() {
            return Ok(rows);
        }
        rows += 1;
    }
}

/// Count the data rows of every source in parallel.
///
/// Every task polls `cancel`, so cancelling stops all counts. Results come back in input order. If any source fails, the error of the
/// first failing source (in input order) is returned once all tasks are done.
pub fn estimate_rows(paths: &[PathBuf], cancel: &CancelGate) -> Result<Vec<RowCount>> {
    let results: Mutex<Vec<(usize, RowCount)>> = Mutex::new(Vec::with_capacity(paths.len()));
    let errors: Mutex<Vec<(usize, Error)>> = Mutex::new(Vec::new());

    rayon::scope(|scope| {
        for (index, path) in paths.iter().enumerate() {
            let results = &results;
            let errors = &errors;
            scope.spawn(move |_| {
                let start = Instant::now();
                match count_rows(path, cancel) {
                    Ok(rows) => {
                        let elapsed = start.elapsed();
                        tracing::debug!(
                            source = %path.display(),
                            rows,
                            elapsed = %format_duration(elapsed),
                            "counted rows"
                        );
                        results.lock().push((
                            index,
                            RowCount {
                                path: path.clone(),
                                rows,
                                elapsed,
                            },
                        ));
                    },
                    Err(e) => errors.lock().push((index, e)),
                }
            });
        }
    });

    let mut errors = errors.into_inner();
    if !errors.is_empty() {
        if errors.iter().any(|(_, e)| e.is_cancelled()) {
            tracing::info!(sources = paths.len(), "row count cancelled");
            return Err(Error::Cancelled);
        }
        errors.sort_by_key(|(index, _)| *index);
        let (index, first) = errors.swap_remove(0);
        tracing::warn!(source = %paths[index].display(), error = %first, "row count failed");
        return Err(first);
    }

    let mut results = results.into_inner();
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, count)| count).collect())
}

/// Count rows of every source that has no count yet and store them.
pub fn fill_row_counts(sources: &mut [SourceFile], cancel: &CancelGate) -> Result<()> {
    let missing: Vec<PathBuf> = sources
        .iter()
        .filter(|s| s.rows.is_none())
        .map(|s| s.path.clone())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut counts = estimate_rows(&missing, cancel)?.into_iter();
    for source in sources.iter_mut().filter(|s| s.rows.is_none()) {
        source.rows = counts.next().map(|c| c.rows);
    }
    Ok(())
}
