//! Cross-checking the schemas of merge sources.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};
use crate::ooxml::cell_type::CellType;
use crate::ooxml::reference::column_to_letters;
use crate::ooxml::schema::{ColumnMeta, SchemaSignature};

/// Why two sources cannot be merged.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaMismatch {
    ColumnCount {
        reference: PathBuf,
        reference_columns: usize,
        file: PathBuf,
        columns: usize,
    },
    /// The lowest column whose style or type differs
    Column {
        column: String,
        reference: PathBuf,
        reference_meta: Option<ColumnMeta>,
        file: PathBuf,
        meta: Option<ColumnMeta>,
    },
}

struct MetaDisplay<'a>(&'a Option<ColumnMeta>);

impl fmt::Display for MetaDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(meta) => write!(f, "style {} / {}", meta.style_id, meta.cell_type),
            None => f.write_str("no cell"),
        }
    }
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaMismatch::ColumnCount {
                reference,
                reference_columns,
                file,
                columns,
            } => write!(
                f,
                "{} has {} columns but {} has {}",
                reference.display(),
                reference_columns,
                file.display(),
                columns
            ),
            SchemaMismatch::Column {
                column,
                reference,
                reference_meta,
                file,
                meta,
            } => write!(
                f,
                "column {column}: {} has {} but {} has {}",
                reference.display(),
                MetaDisplay(reference_meta),
                file.display(),
                MetaDisplay(meta)
            ),
        }
    }
}

/// A column carried on a best-effort basis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedColumn {
    pub column: u32,
    pub cell_type: CellType,
}

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone)]
pub struct ReconciledSchema {
    pub signature: SchemaSignature,
    pub unsupported: Vec<UnsupportedColumn>,
}

/// Compare every source against the first one.
pub fn reconcile(sources: &[(PathBuf, SchemaSignature)]) -> Result<ReconciledSchema> {
    let Some((reference_path, reference)) = sources.first() else {
        return Err(Error::InvalidJob("no sources to reconcile".to_string()));
    };

    for (path, signature) in &sources[1..] {
        if let Some(mismatch) = compare(reference_path, reference, path, signature) {
            tracing::warn!(%mismatch, "schema mismatch");
            return Err(Error::Mismatch(mismatch));
        }
    }

    let unsupported: Vec<UnsupportedColumn> = reference
        .unsupported_columns()
        .into_iter()
        .map(|(column, cell_type)| UnsupportedColumn { column, cell_type })
        .collect();
    for col in &unsupported {
        tracing::warn!(
            column = %column_to_letters(col.column),
            cell_type = %col.cell_type,
            "unsupported column type, values are copied on a best-effort basis"
        );
    }

    Ok(ReconciledSchema {
        signature: reference.clone(),
        unsupported,
    })
}

/// First difference between two signatures, if any.
pub fn compare(
    reference_path: &Path,
    reference: &SchemaSignature,
    path: &Path,
    signature: &SchemaSignature,
) -> Option<SchemaMismatch> {
    if reference.column_count() != signature.column_count() {
        return Some(SchemaMismatch::ColumnCount {
            reference: reference_path.to_path_buf(),
            reference_columns: reference.column_count(),
            file: path.to_path_buf(),
            columns: signature.column_count(),
        });
    }

    let columns: BTreeSet<u32> = reference
        .iter()
        .map(|(c, _)| c)
        .chain(signature.iter().map(|(c, _)| c))
        .collect();
    columns.into_iter().find_map(|col| {
        let left = reference.get(col);
        let right = signature.get(col);
        (left != right).then(|| SchemaMismatch::Column {
            column: column_to_letters(col),
            reference: reference_path.to_path_buf(),
            reference_meta: left.cloned(),
            file: path.to_path_buf(),
            meta: right.cloned(),
        })
    })
}
