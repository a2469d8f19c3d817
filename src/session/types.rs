//! Session data types

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Time column of a record file
pub const TIME_COLUMN: &str = "Time_Sec";

/// Header row of the aggregate summary file
pub const SUMMARY_COLUMNS: [&str; 3] = ["Filename", "Peak_Force_Kg", "Date_Time"];

/// Timestamp format of summary rows
pub const SUMMARY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// State of the recording side of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No active session
    #[default]
    Idle,
    /// Rows are being written
    Recording,
}

impl SessionState {
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Recording => "Recording",
        }
    }
}

/// Report of a completed session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Label as the operator entered it
    pub label: String,
    /// Record file the rows went to
    pub record_path: PathBuf,
    /// Peak magnitude over the session
    pub peak: f64,
    /// Rows written
    pub rows: u64,
    /// Time from session start to end
    pub duration: Duration,
    /// When the session ended
    pub completed_at: DateTime<Local>,
}

impl SessionSummary {
    /// One-line message for the operator
    pub fn message(&self) -> String {
        format!(
            "Test complete: {} peak {:.2} kg ({} rows, {:.1} s)",
            self.label,
            self.peak,
            self.rows,
            self.duration.as_secs_f64()
        )
    }
}
