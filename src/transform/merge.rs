//! Merge engine: N sources, in order, into one target.
//!
//! For xlsx targets every source is probed and the schemas reconciled before
//! the target is created, so a mismatch leaves nothing on disk. Rows then
//! stream one at a time from the current source into the target; the header
//! of the first non-empty source is written once.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::cancel::CancelGate;
use super::options::{TargetFormat, TransformOptions};
use super::progress::{ProgressClock, ProgressScope, ProgressSink, ProgressStage, eta_by_bytes};
use super::reconcile::reconcile;
use super::source::SourceFile;
use super::target::{RowSink, SinkFactory};
use crate::common::error::IoResultExt;
use crate::common::unit::{format_duration, format_size};
use crate::common::{Error, Result};
use crate::logging;
use crate::ooxml::rows::RowStream;
use crate::ooxml::schema::{SchemaSignature, probe};
use crate::ooxml::writer::XlsxTemplate;

/// Sources to combine and the file to combine them into.
#[derive(Debug, Clone)]
pub struct MergeJob {
    pub sources: Vec<SourceFile>,
    pub target: PathBuf,
}

impl MergeJob {
    pub fn new(sources: Vec<SourceFile>, target: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeSummary {
    /// Data rows written, headers excluded
    pub total_data_rows: u64,
    /// Data rows copied from each source, in job order
    pub sources: Vec<(PathBuf, u64)>,
    pub target: PathBuf,
    /// Size of the finalized target
    pub target_bytes: u64,
    pub elapsed: Duration,
}

/// Merge `job.sources` into `job.target`.
///
/// On cancellation the rows written so far are finalized into a readable
/// target and [`Error::Cancelled`] is returned.
pub fn merge(
    job: &MergeJob,
    options: &TransformOptions,
    progress: &mut dyn ProgressSink,
    cancel: &CancelGate,
) -> Result<MergeSummary> {
    if job.sources.len() < 2 {
        return Err(Error::InvalidJob(format!(
            "a merge needs at least 2 sources, got {}",
            job.sources.len()
        )));
    }
    let _log = logging::attach(options.diagnostic_log, &job.target)?;
    let start = Instant::now();
    let format = options.format_for(&job.target);
    tracing::info!(
        sources = job.sources.len(),
        target_file = %job.target.display(),
        ?format,
        "merge started"
    );

    let factory = sink_factory(job, options, format)?;
    cancel.check()?;

    let mut sink = factory.create(&job.target)?;
    let mut current: Option<RowStream> = None;
    let mut copier = Copier::new(job, options);
    let outcome = copier.run(sink.as_mut(), &mut current, progress, cancel);
    // Target first, then the source it was reading from.
    let finished = sink.finish();
    drop(sink);
    drop(current);

    if let Err(e) = outcome {
        if e.is_cancelled() {
            tracing::info!(rows = copier.clock.rows(), "merge cancelled, partial target kept");
        }
        return Err(e);
    }
    finished?;

    let target_bytes = std::fs::metadata(&job.target).at_path(&job.target)?.len();
    let elapsed = start.elapsed();
    tracing::info!(
        rows = copier.clock.rows(),
        target_file = %job.target.display(),
        size = %format_size(target_bytes),
        elapsed = %format_duration(elapsed),
        "merge finished"
    );
    Ok(MergeSummary {
        total_data_rows: copier.clock.rows(),
        sources: copier.per_source,
        target: job.target.clone(),
        target_bytes,
        elapsed,
    })
}

/// Probe and reconcile for xlsx targets; csv targets copy text and skip both.
fn sink_factory<'a>(
    job: &MergeJob,
    options: &'a TransformOptions,
    format: TargetFormat,
) -> Result<SinkFactory<'a>> {
    let (template, schema) = match format {
        TargetFormat::Csv => (XlsxTemplate::default(), SchemaSignature::default()),
        TargetFormat::Xlsx => {
            let probed = job
                .sources
                .iter()
                .map(|s| Ok((s.path.clone(), probe(&s.path)?)))
                .collect::<Result<Vec<_>>>()?;
            let reconciled = reconcile(&probed)?;
            let first = &job.sources[0].path;
            let template = XlsxTemplate::from_source(first)?
                .with_layout(reconciled.signature.layout().clone())
                .with_sheet_name(&options.sheet_name);
            (template, reconciled.signature)
        },
    };
    Ok(SinkFactory {
        format,
        options,
        template,
        schema,
    })
}

/// Row-copying state of one merge.
struct Copier<'a> {
    job: &'a MergeJob,
    clock: ProgressClock,
    per_source: Vec<(PathBuf, u64)>,
    header_written: bool,
    bytes_done: u64,
    bytes_total: u64,
}

impl<'a> Copier<'a> {
    fn new(job: &'a MergeJob, options: &TransformOptions) -> Self {
        Self {
            job,
            clock: ProgressClock::start(options.progress_every),
            per_source: Vec::with_capacity(job.sources.len()),
            header_written: false,
            bytes_done: 0,
            bytes_total: job.sources.iter().map(|s| s.size).sum(),
        }
    }

    fn run(
        &mut self,
        sink: &mut dyn RowSink,
        current: &mut Option<RowStream>,
        progress: &mut dyn ProgressSink,
        cancel: &CancelGate,
    ) -> Result<()> {
        let job = self.job;
        for (index, source) in job.sources.iter().enumerate() {
            cancel.check()?;
            let source_start = Instant::now();
            let stream = current.insert(RowStream::open(&source.path)?);
            let rows = self.copy_source(index, source, stream, sink, progress, cancel)?;
            stream.close();

            self.per_source.push((source.path.clone(), rows));
            self.bytes_done += source.size;
            tracing::info!(
                source = %source.path.display(),
                rows,
                elapsed = %format_duration(source_start.elapsed()),
                "source merged"
            );
            let eta = eta_by_bytes(
                self.clock.elapsed(),
                self.bytes_done,
                self.bytes_total.saturating_sub(self.bytes_done),
            );
            progress.report(&self.clock.event(
                scope(index, &source.path),
                ProgressStage::SourceDone,
                rows,
                eta,
            ));
        }
        Ok(())
    }

    fn copy_source(
        &mut self,
        index: usize,
        source: &SourceFile,
        stream: &mut RowStream,
        sink: &mut dyn RowSink,
        progress: &mut dyn ProgressSink,
        cancel: &CancelGate,
    ) -> Result<u64> {
        let Some(header) = stream.header()? else {
            tracing::debug!(source = %source.path.display(), "source has no rows");
            return Ok(0);
        };
        if !self.header_written {
            sink.write_header(&header)?;
            self.header_written = true;
        }

        let mut rows = 0u64;
        loop {
            cancel.check()?;
            let Some(cells) = stream.next_row()? else {
                break;
            };
            sink.write_row(&source.path, stream.row_number(), &cells)?;
            rows += 1;
            if self.clock.tick() {
                let eta = self.eta_within(source, rows);
                progress.report(&self.clock.event(
                    scope(index, &source.path),
                    ProgressStage::Rows,
                    rows,
                    eta,
                ));
            }
        }
        Ok(rows)
    }

    /// Bytes-weighted ETA while inside `source`, crediting the fraction of
    /// its rows already copied when its row count is known.
    fn eta_within(&self, source: &SourceFile, rows: u64) -> Option<Duration> {
        let partial = match source.rows {
            Some(total) if total > 0 => {
                (source.size as f64 * (rows.min(total) as f64 / total as f64)) as u64
            },
            _ => 0,
        };
        let done = self.bytes_done + partial;
        eta_by_bytes(self.clock.elapsed(), done, self.bytes_total.saturating_sub(done))
    }
}

fn scope(index: usize, path: &Path) -> ProgressScope {
    ProgressScope::Source {
        index,
        path: path.to_path_buf(),
    }
}
