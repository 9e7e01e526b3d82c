//! Job-scoped diagnostic log file.
//!
//! While a [`DiagnosticLog`] is alive, every `tracing` event emitted on the
//! current thread is appended as plain text to `<target>.log`, next to the
//! job's output. Nothing is installed globally.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::subscriber::DefaultGuard;

use crate::common::Result;
use crate::common::error::IoResultExt;

/// Guard of an active diagnostic log. Dropping it detaches the log and
/// deletes the file if nothing was ever written to it.
#[derive(Debug)]
pub struct DiagnosticLog {
    path: PathBuf,
    guard: Option<DefaultGuard>,
}

impl DiagnosticLog {
    /// Path of the log kept for `target`: the same path with a `.log`
    /// extension.
    pub fn path_for(target: &Path) -> PathBuf {
        target.with_extension("log")
    }

    /// Start logging the current thread's events next to `target`.
    pub fn beside(target: &Path) -> Result<Self> {
        let path = Self::path_for(target);
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .at_path(&path)?;

        let subscriber = tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        Ok(Self {
            path,
            guard: Some(tracing::subscriber::set_default(subscriber)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DiagnosticLog {
    fn drop(&mut self) {
        // Detach first so the file handle is closed before it is inspected.
        self.guard.take();
        if fs::metadata(&self.path).is_ok_and(|m| m.len() == 0) {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Start a diagnostic log for `target` when `enabled`.
pub(crate) fn attach(enabled: bool, target: &Path) -> Result<Option<DiagnosticLog>> {
    enabled.then(|| DiagnosticLog::beside(target)).transpose()
}
