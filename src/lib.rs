//! # Tensile Lab: Load Cell Acquisition
//!
//! Reads raw load cell samples from a serial-connected microcontroller,
//! converts them to calibrated force in near real time, and records test
//! sessions to CSV. The architecture separates the link (reader thread)
//! from the processing (worker thread) and from whatever displays the
//! readings.
//!
//! ## Architecture
//!
//! - **Backend**: Owns the serial link and the worker thread
//! - **Pipeline**: Parse, smooth, tare, scale and track the peak
//! - **Session**: Per-sample record files and the aggregate summary file
//! - **Communication**: Crossbeam channels for thread-safe data transfer
//!
//! ## Configuration
//!
//! Project settings live in a TOML file (`tensile-lab.toml`). Application
//! state (last port, recent labels) is stored in the platform data directory
//! under `dev.tensile-lab`:
//!
//! - **Linux**: `~/.local/share/dev.tensile-lab/`
//! - **macOS**: `~/Library/Application Support/dev.tensile-lab/`
//! - **Windows**: `%APPDATA%\dev.tensile-lab\`
//!
//! ## Example
//!
//! ```ignore
//! use tensile_lab::{backend::LabBackend, config::LabConfig};
//!
//! let config = LabConfig::load_or_default("tensile-lab.toml");
//! let (backend, handle) = LabBackend::new(config.clone());
//! backend.spawn()?;
//!
//! handle.connect(handle.list_available_ports()?.remove(0))?;
//! handle.begin_recording("test_run_01", &config.recording)?;
//! // ... pull readings from handle.readings() ...
//! let summary = handle.end_recording()?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use backend::{BackendMessage, LabBackend, LabHandle};
pub use config::{AppState, LabConfig};
pub use error::{LabError, Result};
pub use session::{load_recorded_file, SessionSummary};
pub use types::{ConnectionStatus, PortId, RawSample, Reading, ReadingEvent};
