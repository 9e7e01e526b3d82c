//! Progress events and ETA extrapolation.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// What a progress event is about.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressScope {
    /// A merge source (0-based position in the job)
    Source { index: usize, path: PathBuf },
    /// A split output file (1-based, as in its file name)
    TargetFile { index: u64, path: PathBuf },
}

/// Point in the job the event was emitted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    /// Periodic, every `progress_every` rows
    Rows,
    /// A merge source was fully copied
    SourceDone,
    /// A split output file was finalized
    FileDone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub scope: ProgressScope,
    pub stage: ProgressStage,
    /// Data rows written by the whole job so far
    pub rows_processed: u64,
    /// Data rows written within the current scope
    pub scope_rows: u64,
    /// Time since the job started
    pub elapsed: Duration,
    pub rows_per_sec: f64,
    /// Estimated time until the job finishes, when it can be extrapolated
    pub eta: Option<Duration>,
}

/// Receiver of progress events. Closures taking `&ProgressEvent` implement it.
pub trait ProgressSink {
    fn report(&mut self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressEvent),
{
    fn report(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _event: &ProgressEvent) {}
}

/// Job-scoped clock and row counter the engines report from.
#[derive(Debug)]
pub(crate) struct ProgressClock {
    start: Instant,
    every: u64,
    rows: u64,
}

impl ProgressClock {
    pub fn start(every: u64) -> Self {
        Self {
            start: Instant::now(),
            every,
            rows: 0,
        }
    }

    /// Count one data row; true when a periodic event is due.
    #[inline]
    pub fn tick(&mut self) -> bool {
        self.rows += 1;
        self.every > 0 && self.rows % self.every == 0
    }

    #[inline]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn event(
        &self,
        scope: ProgressScope,
        stage: ProgressStage,
        scope_rows: u64,
        eta: Option<Duration>,
    ) -> ProgressEvent {
        let elapsed = self.elapsed();
        ProgressEvent {
            scope,
            stage,
            rows_processed: self.rows,
            scope_rows,
            elapsed,
            rows_per_sec: rows_per_sec(self.rows, elapsed),
            eta,
        }
    }
}

pub fn rows_per_sec(rows: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { rows as f64 / secs } else { 0.0 }
}

fn scale(elapsed: Duration, ratio: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(elapsed.as_secs_f64() * ratio).ok()
}

/// Remaining time assuming bytes keep flowing at the rate seen so far.
pub fn eta_by_bytes(elapsed: Duration, bytes_done: u64, bytes_todo: u64) -> Option<Duration> {
    if bytes_done == 0 {
        return None;
    }
    scale(elapsed, bytes_todo as f64 / bytes_done as f64)
}

/// Remaining time if every remaining file takes as long as the last one.
pub fn eta_by_files(file_elapsed: Duration, remaining_files: u64) -> Duration {
    file_elapsed.saturating_mul(remaining_files.min(u32::MAX as u64) as u32)
}

/// Remaining time assuming rows keep flowing at the rate seen so far.
pub fn eta_by_rows(elapsed: Duration, rows_done: u64, rows_total: u64) -> Option<Duration> {
    if rows_done == 0 || rows_total < rows_done {
        return None;
    }
    scale(elapsed, (rows_total - rows_done) as f64 / rows_done as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eta_by_bytes() {
        let eta = eta_by_bytes(Duration::from_secs(10), 250, 750).unwrap();
        assert_eq!(eta, Duration::from_secs(30));
        assert_eq!(eta_by_bytes(Duration::from_secs(10), 0, 750), None);
        assert_eq!(eta_by_bytes(Duration::from_secs(10), 100, 0), Some(Duration::ZERO));
    }

    #[test]
    fn test_eta_by_files_and_rows() {
        assert_eq!(eta_by_files(Duration::from_secs(4), 3), Duration::from_secs(12));
        assert_eq!(
            eta_by_rows(Duration::from_secs(2), 1000, 5000),
            Some(Duration::from_secs(8))
        );
        assert_eq!(eta_by_rows(Duration::from_secs(2), 0, 5000), None);
    }

    #[test]
    fn test_clock_ticks_every_n_rows() {
        let mut clock = ProgressClock::start(3);
        let due: Vec<bool> = (0..7).map(|_| clock.tick()).collect();
        assert_eq!(due, vec![false, false, true, false, false, true, false]);
        assert_eq!(clock.rows(), 7);

        let mut silent = ProgressClock::start(0);
        assert!(!(0..10).any(|_| silent.tick()));
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |e: &ProgressEvent| seen.push(e.rows_processed);
            let clock = ProgressClock::start(1);
            let event = clock.event(
                ProgressScope::Source { index: 0, path: PathBuf::from("a.xlsx") },
                ProgressStage::SourceDone,
                0,
                None,
            );
            sink.report(&event);
        }
        assert_eq!(seen, vec![0]);
    }
}
