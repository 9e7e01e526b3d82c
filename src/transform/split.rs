//! Split engine: one source into a numbered sequence of targets.
//!
//! Files are written one at a time into `<dir>/<dir-name>-<index>.<ext>`,
//! each starting with the source header. A file is finalized before the next
//! one is created.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::cancel::CancelGate;
use super::estimate::count_rows;
use super::options::{TargetFormat, TransformOptions};
use super::partition::{PartitionCursor, PartitionMode, PartitionPlan};
use super::progress::{
    ProgressClock, ProgressScope, ProgressSink, ProgressStage, eta_by_files, eta_by_rows,
};
use super::source::SourceFile;
use super::split_dir::{default_split_dir, prepare, split_file_name, split_prefix};
use super::target::{RowSink, SinkFactory};
use crate::common::unit::format_duration;
use crate::common::{Error, Result};
use crate::logging;
use crate::ooxml::reference::column_to_letters;
use crate::ooxml::rows::RowStream;
use crate::ooxml::schema::{SchemaSignature, probe};
use crate::ooxml::writer::XlsxTemplate;

/// A source, how to partition it, and where the pieces go.
#[derive(Debug, Clone)]
pub struct SplitJob {
    pub source: SourceFile,
    /// Output directory; defaults to the source path without its extension
    pub target_dir: Option<PathBuf>,
    pub mode: PartitionMode,
}

impl SplitJob {
    pub fn new(source: SourceFile, mode: PartitionMode) -> Self {
        Self {
            source,
            target_dir: None,
            mode,
        }
    }

    pub fn with_target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    /// Directory the split writes to.
    pub fn target_dir(&self) -> PathBuf {
        self.target_dir
            .clone()
            .unwrap_or_else(|| default_split_dir(&self.source.path))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitSummary {
    /// Data rows written over all files, headers excluded
    pub total_data_rows: u64,
    /// Every output file with its data rows, in order
    pub files: Vec<(PathBuf, u64)>,
    pub target_dir: PathBuf,
    pub elapsed: Duration,
}

/// Split `job.source` into files per `job.mode`.
///
/// Splitting by file count reads the source twice unless `job.source.rows`
/// is already known; files then hold `ceil(rows / k)` rows each, the last
/// one possibly fewer. A known row count never lets a file exceed its row
/// limit. The output directory is only touched once the source header, its
/// first data row and (for xlsx) its schema have been read. On cancellation the file being written is finalized and
/// [`Error::Cancelled`] is returned; files already finished stay in place.
pub fn split(
    job: &SplitJob,
    options: &TransformOptions,
    progress: &mut dyn ProgressSink,
    cancel: &CancelGate,
) -> Result<SplitSummary> {
    job.mode.validate()?;
    let dir = job.target_dir();
    let prefix = split_prefix(&dir)?;
    let _log = logging::attach(options.diagnostic_log, &dir)?;
    let start = Instant::now();
    let source = &job.source.path;
    let format = options.format.unwrap_or(TargetFormat::Xlsx);
    tracing::info!(
        source = %source.display(),
        target_dir = %dir.display(),
        mode = ?job.mode,
        ?format,
        "split started"
    );

    let total = match job.source.rows {
        Some(rows) => Some(rows),
        None if job.mode.needs_row_count() => {
            let rows = count_rows(source, cancel)?;
            tracing::debug!(source = %source.display(), rows, "counted rows for split");
            Some(rows)
        },
        None => None,
    };
    let plan = PartitionPlan::new(job.mode, total)?;

    // Everything that can reject the source runs before the directory is touched.
    let mut stream = RowStream::open(source)?;
    let header = stream.header()?;
    let first = match &header {
        Some(_) => {
            cancel.check()?;
            stream.next_row()?
        },
        None => None,
    };
    let factory = match first {
        Some(_) => Some(sink_factory(source, format, options)?),
        None => None,
    };
    prepare(&dir, &prefix, options.replace_prior_split)?;

    let mut splitter = Splitter {
        source,
        dir: &dir,
        prefix: &prefix,
        plan,
        cursor: plan.cursor(),
        total,
        sink: None,
        file_index: 0,
        file_start: Instant::now(),
        files: Vec::new(),
        clock: ProgressClock::start(options.progress_every),
    };
    let outcome = match (header, first, factory) {
        (Some(header), Some(first), Some(factory)) => {
            splitter.run(&mut stream, &factory, &header, first, progress, cancel)
        },
        _ => {
            tracing::debug!(source = %source.display(), "source has no data rows");
            Ok(())
        },
    };
    // Target first, then the source it was reading from.
    let closed = match &outcome {
        Ok(()) => splitter.close_file(progress),
        Err(_) => splitter.abandon_file(),
    };
    drop(stream);

    if let Err(e) = outcome {
        if e.is_cancelled() {
            tracing::info!(
                rows = splitter.clock.rows(),
                files = splitter.files.len(),
                "split cancelled, partial output kept"
            );
        }
        return Err(e);
    }
    closed?;

    let elapsed = start.elapsed();
    tracing::info!(
        rows = splitter.clock.rows(),
        files = splitter.files.len(),
        elapsed = %format_duration(elapsed),
        "split finished"
    );
    Ok(SplitSummary {
        total_data_rows: splitter.clock.rows(),
        files: splitter.files,
        target_dir: dir.clone(),
        elapsed,
    })
}

/// Sink factory for every file of the split. Xlsx targets copy the probed
/// column layout of `source`.
fn sink_factory<'a>(
    source: &Path,
    format: TargetFormat,
    options: &'a TransformOptions,
) -> Result<SinkFactory<'a>> {
    let (template, schema) = match format {
        TargetFormat::Csv => (XlsxTemplate::default(), SchemaSignature::default()),
        TargetFormat::Xlsx => {
            let schema = probe(source)?;
            for (column, cell_type) in schema.unsupported_columns() {
                tracing::warn!(
                    column = %column_to_letters(column),
                    %cell_type,
                    "unsupported column type, values are copied on a best-effort basis"
                );
            }
            let template = XlsxTemplate::from_source(source)?
                .with_layout(schema.layout().clone())
                .with_sheet_name(&options.sheet_name);
            (template, schema)
        },
    };
    Ok(SinkFactory {
        format,
        options,
        template,
        schema,
    })
}

/// Row-routing state of one split.
struct Splitter<'a> {
    source: &'a Path,
    dir: &'a Path,
    prefix: &'a str,
    plan: PartitionPlan,
    cursor: PartitionCursor,
    total: Option<u64>,
    sink: Option<Box<dyn RowSink>>,
    file_index: u64,
    file_start: Instant,
    files: Vec<(PathBuf, u64)>,
    clock: ProgressClock,
}

impl Splitter<'_> {
    /// Route `first` and every following row of `stream` into files.
    fn run(
        &mut self,
        stream: &mut RowStream,
        factory: &SinkFactory<'_>,
        header: &[String],
        first: Vec<String>,
        progress: &mut dyn ProgressSink,
        cancel: &CancelGate,
    ) -> Result<()> {
        let mut next = Some(first);
        let mut row = 0u64;
        while let Some(cells) = next {
            if let Some(index) = self.cursor.starts_file(row) {
                self.close_file(progress)?;
                self.open_file(factory, index, header)?;
            }
            let Some(sink) = self.sink.as_mut() else {
                return Err(Error::InvalidJob(format!("row {row} has no target file")));
            };
            sink.write_row(self.source, stream.row_number(), &cells)?;
            row += 1;

            if self.clock.tick() {
                let scope_rows = sink.rows_written();
                let path = sink.path().to_path_buf();
                let eta = self
                    .total
                    .and_then(|total| eta_by_rows(self.clock.elapsed(), self.clock.rows(), total));
                progress.report(&self.clock.event(
                    ProgressScope::TargetFile {
                        index: self.file_index,
                        path,
                    },
                    ProgressStage::Rows,
                    scope_rows,
                    eta,
                ));
            }

            cancel.check()?;
            next = stream.next_row()?;
        }
        Ok(())
    }

    fn open_file(&mut self, factory: &SinkFactory<'_>, index: u64, header: &[String]) -> Result<()> {
        let format = factory.format;
        let name = split_file_name(self.prefix, index, self.plan.index_width(), format);
        let path = self.dir.join(name);
        let mut sink = factory.create(&path)?;
        sink.write_header(header)?;
        tracing::debug!(target_file = %path.display(), index, "split file started");
        self.sink = Some(sink);
        self.file_index = index;
        self.file_start = Instant::now();
        Ok(())
    }

    /// Finalize the current file, if any, and report it.
    fn close_file(&mut self, progress: &mut dyn ProgressSink) -> Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        sink.finish()?;
        let rows = sink.rows_written();
        let path = sink.path().to_path_buf();
        let file_elapsed = self.file_start.elapsed();
        tracing::info!(
            target_file = %path.display(),
            rows,
            elapsed = %format_duration(file_elapsed),
            "split file finished"
        );

        let remaining = self
            .plan
            .file_count()
            .map(|count| count.saturating_sub(self.file_index));
        let eta = remaining.map(|r| eta_by_files(file_elapsed, r));
        progress.report(&self.clock.event(
            ProgressScope::TargetFile {
                index: self.file_index,
                path: path.clone(),
            },
            ProgressStage::FileDone,
            rows,
            eta,
        ));
        self.files.push((path, rows));
        Ok(())
    }

    /// Finalize the current file after a failure, without reporting it.
    fn abandon_file(&mut self) -> Result<()> {
        match self.sink.take() {
            Some(mut sink) => sink.finish(),
            None => Ok(()),
        }
    }
}
