//! Settings groups that make up a [`LabConfig`](super::LabConfig)
//!
//! Each group is passed explicitly to the component that needs it: the
//! reader gets [`SerialSettings`], the pipeline [`AcquisitionSettings`],
//! the recorder [`RecordingSettings`]. Nothing reads them from globals.
//!
//! # Main Types
//!
//! - [`SerialSettings`] - Baud rate and read poll interval of the link
//! - [`AcquisitionSettings`] - Smoothing window, channel bound, tick interval
//! - [`CalibrationSettings`] - Initial calibration factor
//! - [`RecordingSettings`] - Save directory, labels, summary file, value column
//! - [`LoggingSettings`] - Optional log file directory

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default baud rate of the load cell firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default calibration factor (raw counts per kilogram)
pub const DEFAULT_CALIBRATION_FACTOR: f64 = 2180.0;

/// Default smoothing window length
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;

/// Default summary file name inside the save directory
pub const DEFAULT_SUMMARY_FILE: &str = "doe_summary.csv";

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Longest a single read may block before the reader re-checks its stop flag
    pub poll_interval_ms: u64,
    /// Lines longer than this without a terminator are discarded as noise
    pub max_line_len: usize,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            poll_interval_ms: 20,
            max_line_len: 256,
        }
    }
}

impl SerialSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Acquisition pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Number of raw samples averaged by the smoothing filter
    pub smoothing_window: usize,
    /// Bound of the reader → consumer sample channel
    pub channel_capacity: usize,
    /// Period of the consumer tick
    pub tick_interval_ms: u64,
    /// How long one send attempt waits on a full channel before re-checking
    pub backpressure_wait_ms: u64,
    /// How often statistics are published to the UI
    pub stats_interval_ms: u64,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            channel_capacity: 1024,
            tick_interval_ms: 10,
            backpressure_wait_ms: 5,
            stats_interval_ms: 500,
        }
    }
}

impl AcquisitionSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn backpressure_wait(&self) -> Duration {
        Duration::from_millis(self.backpressure_wait_ms.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

/// Calibration settings applied when the backend starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Raw counts per unit of force
    pub factor: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            factor: DEFAULT_CALIBRATION_FACTOR,
        }
    }
}

/// Which value the second column of a record file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueColumn {
    /// Calibrated force (`Force_Kg`)
    #[default]
    Force,
    /// Unsmoothed raw sample (`Raw_Force`)
    Raw,
}

impl ValueColumn {
    /// Header name of the column
    pub fn header(&self) -> &'static str {
        match self {
            ValueColumn::Force => "Force_Kg",
            ValueColumn::Raw => "Raw_Force",
        }
    }
}

/// Recording settings passed to `begin_recording`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Directory holding record files and the summary file
    pub save_dir: PathBuf,
    /// Label suggested for the next session
    pub default_label: String,
    /// Summary file name, resolved inside `save_dir`
    pub summary_file: String,
    /// Second column of the record file
    pub value_column: ValueColumn,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("."),
            default_label: String::from("test_run_01"),
            summary_file: String::from(DEFAULT_SUMMARY_FILE),
            value_column: ValueColumn::Force,
        }
    }
}

impl RecordingSettings {
    /// Settings rooted at a directory
    pub fn in_dir(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
            ..Self::default()
        }
    }

    /// Record file path for a session label, appending `.csv` if missing
    pub fn record_path(&self, label: &str) -> PathBuf {
        let label = label.trim();
        if label.to_ascii_lowercase().ends_with(".csv") {
            self.save_dir.join(label)
        } else {
            self.save_dir.join(format!("{label}.csv"))
        }
    }

    /// Path of the aggregate summary file
    pub fn summary_path(&self) -> PathBuf {
        self.save_dir.join(&self.summary_file)
    }

    /// Whether the save directory exists
    pub fn save_dir_exists(&self) -> bool {
        Path::new(&self.save_dir).is_dir()
    }
}

/// Logging settings for the binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for daily rolling log files; stderr only when unset
    pub log_dir: Option<PathBuf>,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub filter: Option<String>,
}
