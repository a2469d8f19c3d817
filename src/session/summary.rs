//! Aggregate summary log
//!
//! One row per completed session, appended to a file shared by all
//! sessions in a save directory. The header is written only when the file
//! is first created (or found empty); existing rows are never rewritten.

use crate::error::{Result, ResultExt};
use crate::session::types::{SUMMARY_COLUMNS, SUMMARY_TIME_FORMAT};
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Append-only summary file
#[derive(Debug, Clone)]
pub struct SummaryLog {
    path: PathBuf,
}

impl SummaryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one session row
    pub fn append(&self, label: &str, peak: f64, completed_at: DateTime<Local>) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Opening summary file {}", self.path.display()))?;

        let needs_header = file
            .metadata()
            .with_context(|| format!("Reading summary file {}", self.path.display()))?
            .len()
            == 0;

        // One flush so a header and its first row land together
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        if needs_header {
            writer
                .write_record(SUMMARY_COLUMNS)
                .with_context(|| format!("Writing summary file {}", self.path.display()))?;
        }
        let peak = format!("{:.2}", peak);
        let completed_at = completed_at.format(SUMMARY_TIME_FORMAT).to_string();
        writer
            .write_record([label, peak.as_str(), completed_at.as_str()])
            .with_context(|| format!("Writing summary file {}", self.path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Writing summary file {}", self.path.display()))?;

        tracing::info!("Summary row appended for {} (peak {})", label, peak);
        Ok(())
    }
}
