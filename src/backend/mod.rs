//! Backend module for load cell acquisition over a serial link
//!
//! This module runs the acquisition in background threads so the control
//! surface (a GUI, the headless binary, or a test) never blocks on the
//! link. It uses crossbeam channels to talk to the caller.
//!
//! # Architecture
//!
//! Two threads run while streaming:
//!
//! - the **reader** owns the link, frames and parses lines, and queues
//!   samples on a bounded channel ([`reader`])
//! - the **worker** owns the pipeline: it handles commands, ticks the
//!   pipeline, and reports status ([`worker`])
//!
//! The caller holds a [`LabHandle`]:
//!
//! - [`BackendCommand`] - Requests sent to the worker (connect, record, ...)
//! - [`BackendMessage`] - Status sent back (connection state, errors, stats)
//! - readings arrive on their own bounded channel, see [`LabHandle::readings`]
//!
//! Calibration (tare, factor) is applied directly to the shared calibration
//! state, so it takes effect on the next sample without a round trip.
//!
//! # Example
//!
//! ```ignore
//! use tensile_lab::backend::LabBackend;
//! use tensile_lab::config::{LabConfig, RecordingSettings};
//!
//! let (backend, handle) = LabBackend::new(LabConfig::default());
//! backend.spawn()?;
//!
//! let port = handle.list_available_ports()?.remove(0);
//! handle.connect(port)?;
//! handle.tare();
//! handle.begin_recording("test_run_01", &RecordingSettings::default())?;
//!
//! for event in handle.drain_readings() {
//!     println!("{:.2} kg (peak {:.2})", event.reading.force, event.peak);
//! }
//!
//! let summary = handle.end_recording()?;
//! ```

pub mod framer;
pub mod link;
pub mod mock_link;
pub mod reader;
pub mod serial;
pub mod worker;

pub use link::{LinkOpener, SerialLink};
pub use mock_link::{MockEnd, MockFeeder, MockLink, MockOpener};
pub use reader::{LinkEvent, ReaderHandle, ReaderStats};
pub use serial::{list_available_ports, SerialPortLink, SerialPortOpener};
pub use worker::BackendWorker;

use crate::config::{LabConfig, RecordingSettings};
use crate::error::{LabError, Result};
use crate::pipeline::{AcquisitionPipeline, ChannelObserver, ReadingObserver, SharedCalibration};
use crate::session::SessionSummary;
use crate::types::{AcquisitionStats, ConnectionStatus, PortId, Reading, ReadingEvent};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long a blocking request waits for the worker
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Reply channel for a request
pub type Reply<T> = Sender<Result<T>>;

/// Message sent from the control surface to the worker
pub enum BackendCommand {
    /// Open a port and start streaming
    Connect { port: PortId, reply: Reply<()> },
    /// Stop streaming and release the port; ends any active recording
    Disconnect {
        reply: Reply<Option<SessionSummary>>,
    },
    /// Start a recording session
    BeginRecording {
        label: String,
        settings: RecordingSettings,
        reply: Reply<PathBuf>,
    },
    /// End the recording session, if any
    EndRecording {
        reply: Reply<Option<SessionSummary>>,
    },
    /// Register another reading observer
    AddObserver(Box<dyn ReadingObserver>),
    /// Request current statistics
    RequestStats,
    /// Shutdown the backend
    Shutdown,
}

impl std::fmt::Debug for BackendCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendCommand::Connect { port, .. } => write!(f, "Connect({})", port),
            BackendCommand::Disconnect { .. } => write!(f, "Disconnect"),
            BackendCommand::BeginRecording { label, .. } => write!(f, "BeginRecording({})", label),
            BackendCommand::EndRecording { .. } => write!(f, "EndRecording"),
            BackendCommand::AddObserver(_) => write!(f, "AddObserver"),
            BackendCommand::RequestStats => write!(f, "RequestStats"),
            BackendCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Message sent from the worker to the control surface
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Connection state changed
    ConnectionStatus(ConnectionStatus),
    /// A port could not be opened
    ConnectError(String),
    /// The open link failed; the backend has disconnected
    TransportError(String),
    /// A recording session started
    RecordingStarted { label: String, path: PathBuf },
    /// A record or summary file could not be written
    RecordingError(String),
    /// A recording session ended
    RecordingComplete(SessionSummary),
    /// Periodic acquisition counters
    Stats(AcquisitionStats),
    /// Backend is shutting down
    Shutdown,
}

/// Control surface for a running backend
pub struct LabHandle {
    /// Receiver for backend messages
    receiver: Receiver<BackendMessage>,
    /// Sender for commands to the backend
    command_sender: Sender<BackendCommand>,
    readings: Receiver<ReadingEvent>,
    calibration: SharedCalibration,
    opener: Arc<dyn LinkOpener>,
}

impl LabHandle {
    /// Ports the operator can connect to
    pub fn list_available_ports(&self) -> Result<Vec<PortId>> {
        self.opener.list_ports()
    }

    /// Open a port and start streaming
    pub fn connect(&self, port: PortId) -> Result<()> {
        self.request(|reply| BackendCommand::Connect { port, reply })
    }

    /// Stop streaming and release the port
    ///
    /// Returns the summary of the recording session this ended, if any.
    pub fn disconnect(&self) -> Result<Option<SessionSummary>> {
        self.request(|reply| BackendCommand::Disconnect { reply })
    }

    /// Zero the output at the current smoothed input
    ///
    /// Returns `None` if no sample has arrived yet.
    pub fn tare(&self) -> Option<f64> {
        self.calibration.tare()
    }

    pub fn clear_tare(&self) {
        self.calibration.clear_tare()
    }

    /// Set the calibration factor; returns the factor in effect
    pub fn set_calibration_factor(&self, factor: f64) -> f64 {
        self.calibration.set_calibration_factor(factor)
    }

    /// Set the calibration factor from operator text
    pub fn set_calibration_factor_input(&self, input: &str) -> f64 {
        self.calibration.set_calibration_factor_input(input)
    }

    /// Whether the last factor was unusable and replaced by 1.0
    pub fn factor_substituted(&self) -> bool {
        self.calibration.factor_substituted()
    }

    pub fn calibration(&self) -> &SharedCalibration {
        &self.calibration
    }

    /// Start a recording session; returns the record file path
    pub fn begin_recording(&self, label: &str, settings: &RecordingSettings) -> Result<PathBuf> {
        let label = label.to_string();
        let settings = settings.clone();
        self.request(|reply| BackendCommand::BeginRecording {
            label,
            settings,
            reply,
        })
    }

    /// End the recording session; `Ok(None)` if none was active
    pub fn end_recording(&self) -> Result<Option<SessionSummary>> {
        self.request(|reply| BackendCommand::EndRecording { reply })
    }

    /// Reload a record file for offline viewing
    pub fn load_recorded_file(&self, path: impl AsRef<Path>) -> Result<Vec<Reading>> {
        crate::session::load_recorded_file(path)
    }

    /// Register an observer on the worker thread
    pub fn subscribe(&self, observer: Box<dyn ReadingObserver>) -> bool {
        self.send_command(BackendCommand::AddObserver(observer))
    }

    /// Readings for display, in arrival order
    pub fn readings(&self) -> &Receiver<ReadingEvent> {
        &self.readings
    }

    /// Take all queued readings
    pub fn drain_readings(&self) -> Vec<ReadingEvent> {
        self.readings.try_iter().collect()
    }

    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<BackendMessage> {
        self.receiver.try_recv().ok()
    }

    /// Receive a message, waiting up to `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Option<BackendMessage> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<BackendMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Ask for a [`BackendMessage::Stats`]
    pub fn request_stats(&self) {
        let _ = self.command_sender.send(BackendCommand::RequestStats);
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        let _ = self.command_sender.send(BackendCommand::Shutdown);
    }

    /// Send a command to the backend
    pub fn send_command(&self, cmd: BackendCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    fn request<T>(&self, make: impl FnOnce(Reply<T>) -> BackendCommand) -> Result<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.command_sender
            .send(make(reply_tx))
            .map_err(|_| LabError::Channel("Backend is not running".to_string()))?;

        match reply_rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                Err(LabError::Channel("Backend did not reply in time".to_string()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(LabError::Channel("Backend stopped before replying".to_string()))
            }
        }
    }
}

/// The acquisition backend, run on its own thread
pub struct LabBackend {
    /// Configuration
    config: LabConfig,
    /// Receiver for commands from the control surface
    command_receiver: Receiver<BackendCommand>,
    /// Sender for messages to the control surface
    message_sender: Sender<BackendMessage>,
    /// Running flag
    running: Arc<AtomicBool>,
    opener: Arc<dyn LinkOpener>,
    pipeline: AcquisitionPipeline,
}

impl LabBackend {
    /// Create a backend that opens real serial ports
    pub fn new(config: LabConfig) -> (Self, LabHandle) {
        Self::with_opener(config, Arc::new(SerialPortOpener))
    }

    /// Create a backend with a custom link opener
    pub fn with_opener(config: LabConfig, opener: Arc<dyn LinkOpener>) -> (Self, LabHandle) {
        let (cmd_tx, cmd_rx) = bounded(256);
        let (msg_tx, msg_rx) = bounded(256);
        // Display queue holds every reading until the control surface drains it
        let (reading_tx, reading_rx) = unbounded();

        let calibration = SharedCalibration::new(config.calibration.factor);
        let mut pipeline = AcquisitionPipeline::new(&config, calibration.clone());
        pipeline.add_observer(Box::new(ChannelObserver::new(reading_tx)));

        let backend = Self {
            config,
            command_receiver: cmd_rx,
            message_sender: msg_tx,
            running: Arc::new(AtomicBool::new(true)),
            opener: opener.clone(),
            pipeline,
        };

        let handle = LabHandle {
            receiver: msg_rx,
            command_sender: cmd_tx,
            readings: reading_rx,
            calibration,
            opener,
        };

        (backend, handle)
    }

    /// Run the backend loop on the current thread
    pub fn run(self) {
        let mut worker = BackendWorker::new(
            self.config,
            self.command_receiver,
            self.message_sender,
            self.running,
            self.opener,
            self.pipeline,
        );
        worker.run();
    }

    /// Run the backend loop on a new thread
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("lab-backend".to_string())
            .spawn(move || self.run())
            .map_err(|e| LabError::Channel(format!("Failed to spawn backend thread: {}", e)))
    }

    /// Get a handle to stop the backend
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_backend_creation() {
        let (backend, handle) = LabBackend::with_opener(
            LabConfig::default(),
            Arc::new(MockOpener::new().with_link(MockLink::from_samples("mock0", &[1]))),
        );
        assert!(backend.stop_handle().load(Ordering::SeqCst));
        assert_eq!(backend.pipeline.observer_count(), 1);
        let ports = handle.list_available_ports().unwrap();
        assert_eq!(ports, vec![PortId::new("mock0").with_description("Mock")]);
        assert!(handle.try_recv().is_none());
    }

    #[test]
    fn test_calibration_is_shared() {
        let (backend, handle) =
            LabBackend::with_opener(LabConfig::default(), Arc::new(MockOpener::new()));
        assert_eq!(handle.set_calibration_factor_input("abc"), 1.0);
        assert!(handle.factor_substituted());
        assert_eq!(backend.pipeline.calibration().snapshot().calibration_factor, 1.0);
    }

    #[test]
    fn test_request_fails_when_backend_dropped() {
        let (backend, handle) =
            LabBackend::with_opener(LabConfig::default(), Arc::new(MockOpener::new()));
        drop(backend);
        assert!(matches!(
            handle.connect(PortId::new("mock0")),
            Err(LabError::Channel(_))
        ));
    }

    #[test]
    fn test_command_debug() {
        let (tx, _rx) = bounded(1);
        let cmd = BackendCommand::Connect {
            port: PortId::new("COM4"),
            reply: tx,
        };
        assert_eq!(format!("{:?}", cmd), "Connect(COM4)");
    }
}
