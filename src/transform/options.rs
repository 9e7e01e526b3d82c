//! Job configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default number of rows between progress events.
pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;

/// Sheet name written into xlsx targets unless overridden.
pub const DEFAULT_SHEET_NAME: &str = "data";

/// Output container of a merge or split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Xlsx,
    Csv,
}

impl TargetFormat {
    /// `.csv` (any case) is CSV; everything else is xlsx.
    pub fn infer(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => TargetFormat::Csv,
            _ => TargetFormat::Xlsx,
        }
    }

    /// File extension written for this format.
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Xlsx => "xlsx",
            TargetFormat::Csv => "csv",
        }
    }
}

/// Knobs shared by the merge and split engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Rows between progress events; 0 disables row progress
    pub progress_every: u64,
    /// Prefix csv targets with a UTF-8 BOM
    pub csv_bom: bool,
    /// Field delimiter of csv targets
    pub csv_delimiter: u8,
    /// Sheet name of xlsx targets
    pub sheet_name: String,
    /// Allow a split to delete the files of a previous split in its directory
    pub replace_prior_split: bool,
    /// Write `<target>.log` next to the output
    pub diagnostic_log: bool,
    /// Force the target format instead of inferring it from the extension
    pub format: Option<TargetFormat>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            progress_every: DEFAULT_PROGRESS_EVERY,
            csv_bom: true,
            csv_delimiter: b',',
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            replace_prior_split: false,
            diagnostic_log: false,
            format: None,
        }
    }
}

impl TransformOptions {
    pub fn with_progress_every(mut self, rows: u64) -> Self {
        self.progress_every = rows;
        self
    }

    pub fn with_csv_bom(mut self, bom: bool) -> Self {
        self.csv_bom = bom;
        self
    }

    pub fn with_csv_delimiter(mut self, delimiter: u8) -> Self {
        self.csv_delimiter = delimiter;
        self
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    pub fn with_replace_prior_split(mut self, replace: bool) -> Self {
        self.replace_prior_split = replace;
        self
    }

    pub fn with_diagnostic_log(mut self, enabled: bool) -> Self {
        self.diagnostic_log = enabled;
        self
    }

    pub fn with_format(mut self, format: TargetFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Format for `path`: the forced one, else inferred from the extension.
    pub fn format_for(&self, path: &Path) -> TargetFormat {
        self.format.unwrap_or_else(|| TargetFormat::infer(path))
    }
}
