//! Configuration module for Tensile Lab
//!
//! This module handles application configuration including:
//! - The lab configuration file (TOML) with serial, acquisition,
//!   calibration and recording settings
//! - Application state persistence (last port, last save directory,
//!   recent session labels)
//!
//! # App Data Location
//!
//! Application state is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.tensile-lab/`
//! - **macOS**: `~/Library/Application Support/dev.tensile-lab/`
//! - **Windows**: `%APPDATA%\dev.tensile-lab\`
//!
//! # Files
//!
//! - `app_state.json` - Last connection and recent labels
//! - `tensile-lab.toml` - Lab configuration, wherever the operator keeps it
//!
//! # Example
//!
//! ```ignore
//! use tensile_lab::config::{AppState, LabConfig};
//!
//! let config = LabConfig::load_or_default("tensile-lab.toml");
//! let mut state = AppState::load_or_default();
//!
//! state.remember_port("/dev/ttyACM0");
//! state.save()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{LabError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.tensile-lab";

/// App state filename
pub const APP_STATE_FILE: &str = "app_state.json";

/// Default lab configuration filename
pub const CONFIG_FILE: &str = "tensile-lab.toml";

/// Maximum number of recent labels to remember
pub const MAX_RECENT_LABELS: usize = 10;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        LabError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            LabError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the app state file
pub fn app_state_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_STATE_FILE))
}

// ==================== Lab Config ====================

/// Complete lab configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabConfig {
    /// Serial link settings
    #[serde(default)]
    pub serial: SerialSettings,

    /// Acquisition pipeline settings
    #[serde(default)]
    pub acquisition: AcquisitionSettings,

    /// Calibration applied at startup
    #[serde(default)]
    pub calibration: CalibrationSettings,

    /// Recording settings
    #[serde(default)]
    pub recording: RecordingSettings,

    /// Logging settings for the binary
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl LabConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| LabError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LabError::Config(format!("Failed to read configuration {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load a configuration file, returning defaults if it is missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load configuration, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LabError::Serialization(format!("Failed to serialize configuration: {}", e)))?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| LabError::Config(format!("Failed to write configuration: {}", e)))
    }
}

// ==================== App State ====================

/// Persistent application state
///
/// Remembers what the operator used last so the next run can offer it
/// again. Separate from the lab configuration, which is edited by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppState {
    /// Version for future migration support
    #[serde(default = "default_app_state_version")]
    pub version: u32,

    /// Last port successfully connected to
    #[serde(default)]
    pub last_port: Option<String>,

    /// Last directory recorded into
    #[serde(default)]
    pub last_save_dir: Option<PathBuf>,

    /// Recently used session labels, most recent first
    #[serde(default)]
    pub recent_labels: Vec<String>,
}

fn default_app_state_version() -> u32 {
    1
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: 1,
            last_port: None,
            last_save_dir: None,
            recent_labels: Vec::new(),
        }
    }
}

impl AppState {
    /// Load app state from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LabError::Config(format!("Failed to read app state: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| LabError::Config(format!("Failed to parse app state: {}", e)))
    }

    /// Load app state from the default location
    pub fn load() -> Result<Self> {
        let path = app_state_path().ok_or_else(|| {
            LabError::Config("Could not determine app state path".to_string())
        })?;
        Self::load_from(path)
    }

    /// Load app state, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load app state, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save app state to a specific file
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| LabError::Config(format!("Failed to serialize app state: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| LabError::Config(format!("Failed to write app state: {}", e)))
    }

    /// Save app state to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(APP_STATE_FILE))
    }

    /// Remember the port of a successful connection
    pub fn remember_port(&mut self, port: &str) {
        self.last_port = Some(port.to_string());
    }

    /// Remember a session label and the directory it was saved in
    pub fn remember_session(&mut self, label: &str, save_dir: impl AsRef<Path>) {
        self.recent_labels.retain(|l| l != label);
        self.recent_labels.insert(0, label.to_string());
        self.recent_labels.truncate(MAX_RECENT_LABELS);
        self.last_save_dir = Some(save_dir.as_ref().to_path_buf());
    }
}
