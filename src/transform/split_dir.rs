//! Output directory of a split job.
//!
//! A split writes `<dir-name>-<index>.<ext>` files into a directory named
//! after the source. The directory must be empty or hold nothing but the
//! output of an earlier split, which is only removed with the caller's
//! consent. Anything else is left alone and reported as a conflict.

use std::fs;
use std::path::{Path, PathBuf};

use super::options::TargetFormat;
use crate::common::error::IoResultExt;
use crate::common::{Error, Result};

/// What a split found in its target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirState {
    Missing,
    Empty,
    /// Only files carrying the split prefix
    PriorSplit { files: Vec<PathBuf> },
}

/// Directory a split of `source` writes to by default: the source path
/// without its extension.
pub fn default_split_dir(source: &Path) -> PathBuf {
    source.with_extension("")
}

/// Prefix of split output names: the directory's own name.
pub fn split_prefix(dir: &Path) -> Result<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidJob(format!("{} has no usable directory name", dir.display())))
}

/// `<prefix>-<index>.<ext>`, the index zero-padded to `width` digits.
pub fn split_file_name(prefix: &str, index: u64, width: usize, format: TargetFormat) -> String {
    format!("{prefix}-{index:0width$}.{}", format.extension())
}

/// Classify the contents of `dir`.
pub fn inspect(dir: &Path, prefix: &str) -> Result<DirState> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(DirState::Missing),
        Err(source) => {
            return Err(Error::Io {
                path: dir.to_path_buf(),
                source,
            });
        },
    };

    let split_prefix = format!("{prefix}-");
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.at_path(dir)?;
        let path = entry.path();
        let is_file = entry.file_type().at_path(&path)?.is_file();
        let name = entry.file_name();
        let looks_like_split = name
            .to_str()
            .is_some_and(|n| n.starts_with(&split_prefix));
        if !is_file || !looks_like_split {
            return Err(Error::Conflict {
                path: dir.to_path_buf(),
                reason: format!("contains unrelated entry {}", name.to_string_lossy()),
            });
        }
        files.push(path);
    }

    if files.is_empty() {
        Ok(DirState::Empty)
    } else {
        files.sort();
        Ok(DirState::PriorSplit { files })
    }
}

/// Make `dir` ready to receive split output.
///
/// Creates it when missing. A prior split is deleted only if
/// `replace_prior` is set; otherwise it is a [`Error::Conflict`].
pub fn prepare(dir: &Path, prefix: &str, replace_prior: bool) -> Result<()> {
    match inspect(dir, prefix)? {
        DirState::Missing => {
            fs::create_dir_all(dir).at_path(dir)?;
            tracing::debug!(dir = %dir.display(), "created split directory");
        },
        DirState::Empty => {},
        DirState::PriorSplit { files } if replace_prior => {
            for file in &files {
                fs::remove_file(file).at_path(file)?;
            }
            tracing::info!(dir = %dir.display(), removed = files.len(), "removed previous split output");
        },
        DirState::PriorSplit { files } => {
            return Err(Error::Conflict {
                path: dir.to_path_buf(),
                reason: format!(
                    "holds {} files of a previous split; confirm replacing them",
                    files.len()
                ),
            });
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(
            default_split_dir(Path::new("/data/sales.xlsx")),
            PathBuf::from("/data/sales")
        );
        assert_eq!(split_prefix(Path::new("/data/sales")).unwrap(), "sales");
        assert_eq!(split_file_name("sales", 3, 0, TargetFormat::Xlsx), "sales-3.xlsx");
        assert_eq!(split_file_name("sales", 3, 3, TargetFormat::Csv), "sales-003.csv");
        assert_eq!(split_file_name("sales", 1234, 2, TargetFormat::Csv), "sales-1234.csv");
    }

    #[test]
    fn test_missing_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("sales");
        assert_eq!(inspect(&dir, "sales").unwrap(), DirState::Missing);
        prepare(&dir, "sales", false).unwrap();
        assert!(dir.is_dir());
        assert_eq!(inspect(&dir, "sales").unwrap(), DirState::Empty);
    }

    #[test]
    fn test_prior_split_requires_confirmation() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("sales");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("sales-1.xlsx"), b"x").unwrap();
        fs::write(dir.join("sales-2.xlsx"), b"x").unwrap();

        assert!(matches!(
            prepare(&dir, "sales", false),
            Err(Error::Conflict { .. })
        ));
        assert!(dir.join("sales-1.xlsx").exists());

        prepare(&dir, "sales", true).unwrap();
        assert_eq!(inspect(&dir, "sales").unwrap(), DirState::Empty);
    }

    #[test]
    fn test_unrelated_files_are_never_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("sales");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("sales-1.xlsx"), b"x").unwrap();
        fs::write(dir.join("notes.txt"), b"keep me").unwrap();

        assert!(matches!(
            prepare(&dir, "sales", true),
            Err(Error::Conflict { .. })
        ));
        assert!(dir.join("notes.txt").exists());
        assert!(dir.join("sales-1.xlsx").exists());
    }

    #[test]
    fn test_subdirectory_is_a_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("sales");
        fs::create_dir_all(dir.join("sales-archive")).unwrap();
        assert!(matches!(inspect(&dir, "sales"), Err(Error::Conflict { .. })));
    }
}
