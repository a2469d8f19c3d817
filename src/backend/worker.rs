//! Backend Worker Thread Implementation
//!
//! This module contains the main worker loop that runs in a separate thread
//! and owns the acquisition pipeline. It communicates with the control
//! surface through crossbeam channels.
//!
//! # Responsibilities
//!
//! The worker thread handles:
//!
//! - **Command processing**: Responds to connect, disconnect and recording requests
//! - **Pipeline ticks**: Drains queued samples at the configured tick interval
//! - **Connection state**: Drives Disconnected → Connecting → Streaming and back
//! - **Failure handling**: A failed link disconnects and closes any recording
//! - **Statistics**: Publishes acquisition counters periodically
//!
//! # Rate Limiting
//!
//! Each loop iteration is padded to the tick interval (default 10 ms), which
//! bounds the latency between a sample being queued and its reading being
//! published.

use crate::backend::link::LinkOpener;
use crate::backend::{BackendCommand, BackendMessage};
use crate::config::{LabConfig, RecordingSettings};
use crate::error::{LabError, Result};
use crate::pipeline::{AcquisitionPipeline, TickOutcome};
use crate::session::SessionSummary;
use crate::types::{ConnectionStatus, PortId};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The backend worker that runs the tick loop
pub struct BackendWorker {
    /// Application configuration
    config: LabConfig,
    /// Command receiver from the control surface
    command_rx: Receiver<BackendCommand>,
    /// Message sender to the control surface
    message_tx: Sender<BackendMessage>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Opens links on connect
    opener: Arc<dyn LinkOpener>,
    pipeline: AcquisitionPipeline,
    /// Current connection status
    connection_status: ConnectionStatus,
    /// Port of the open link
    port: Option<PortId>,
    tick_interval: Duration,
    stats_interval: Duration,
    /// Last tick time for rate limiting
    last_tick_time: Instant,
    /// Last time stats were sent
    last_stats_time: Instant,
    /// Status messages the control surface was too slow to take
    dropped_messages: u64,
}

impl BackendWorker {
    /// Create a new backend worker
    pub fn new(
        config: LabConfig,
        command_rx: Receiver<BackendCommand>,
        message_tx: Sender<BackendMessage>,
        running: Arc<AtomicBool>,
        opener: Arc<dyn LinkOpener>,
        pipeline: AcquisitionPipeline,
    ) -> Self {
        let tick_interval = config.acquisition.tick_interval();
        let stats_interval = config.acquisition.stats_interval();

        Self {
            config,
            command_rx,
            message_tx,
            running,
            opener,
            pipeline,
            connection_status: ConnectionStatus::Disconnected,
            port: None,
            tick_interval,
            stats_interval,
            last_tick_time: Instant::now(),
            last_stats_time: Instant::now(),
            dropped_messages: 0,
        }
    }

    /// Run the main worker loop
    pub fn run(&mut self) {
        tracing::info!("Backend worker started");

        while self.running.load(Ordering::SeqCst) {
            self.process_commands();

            if self.connection_status.is_streaming() {
                let outcome = self.pipeline.tick();
                self.handle_outcome(outcome);

                if self.last_stats_time.elapsed() >= self.stats_interval {
                    self.send_stats();
                    self.last_stats_time = Instant::now();
                }
            }

            self.rate_limit();
        }

        // Cleanup
        if let Err(e) = self.disconnect() {
            tracing::error!("Error while shutting down: {}", e);
        }

        let _ = self.message_tx.send(BackendMessage::Shutdown);
        if self.dropped_messages > 0 {
            tracing::debug!("{} status messages were dropped", self.dropped_messages);
        }
        tracing::info!("Backend worker stopped");
    }

    /// Process pending commands
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: BackendCommand) {
        tracing::trace!("Command: {:?}", cmd);
        match cmd {
            BackendCommand::Connect { port, reply } => {
                let _ = reply.send(self.connect(port));
            }
            BackendCommand::Disconnect { reply } => {
                let _ = reply.send(self.disconnect());
            }
            BackendCommand::BeginRecording {
                label,
                settings,
                reply,
            } => {
                let _ = reply.send(self.begin_recording(&label, &settings));
            }
            BackendCommand::EndRecording { reply } => {
                let _ = reply.send(self.end_recording());
            }
            BackendCommand::AddObserver(observer) => {
                self.pipeline.add_observer(observer);
            }
            BackendCommand::RequestStats => self.send_stats(),
            BackendCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Open a port and start the reader
    fn connect(&mut self, port: PortId) -> Result<()> {
        if let Some(current) = &self.port {
            return Err(LabError::AlreadyConnected(current.name.clone()));
        }

        self.update_connection_status(ConnectionStatus::Connecting);

        let opened = self.opener.open(&port, &self.config.serial);
        match opened.and_then(|link| self.pipeline.start(link)) {
            Ok(()) => {
                tracing::info!("Connected to {}", port);
                self.port = Some(port);
                self.last_stats_time = Instant::now();
                self.update_connection_status(ConnectionStatus::Streaming);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to connect to {}: {}", port, e);
                self.update_connection_status(ConnectionStatus::Disconnected);
                self.try_send_message(BackendMessage::ConnectError(e.to_string()));
                Err(e)
            }
        }
    }

    /// Stop the reader, close any recording, and release the port
    ///
    /// Every queued sample is processed (and recorded) before the recording
    /// is closed.
    fn disconnect(&mut self) -> Result<Option<SessionSummary>> {
        let outcome = self.pipeline.stop();
        if let Some(e) = outcome.recording_error {
            self.report_recording_error(&e);
        }
        if let Some(message) = outcome.link_error {
            tracing::debug!("Link closed during stop: {}", message);
        }

        let ended = self.end_recording();

        if let Some(port) = self.port.take() {
            tracing::info!("Disconnected from {}", port);
        }
        if self.connection_status != ConnectionStatus::Disconnected {
            self.update_connection_status(ConnectionStatus::Disconnected);
        }
        ended
    }

    fn begin_recording(&mut self, label: &str, settings: &RecordingSettings) -> Result<PathBuf> {
        if !self.connection_status.is_streaming() {
            return Err(LabError::NotConnected);
        }

        match self.pipeline.begin_recording(label, settings) {
            Ok(path) => {
                self.try_send_message(BackendMessage::RecordingStarted {
                    label: label.trim().to_string(),
                    path: path.clone(),
                });
                Ok(path)
            }
            Err(e) => {
                self.report_recording_error(&e);
                Err(e)
            }
        }
    }

    fn end_recording(&mut self) -> Result<Option<SessionSummary>> {
        match self.pipeline.end_recording() {
            Ok(Some(summary)) => {
                tracing::info!("{}", summary.message());
                self.try_send_message(BackendMessage::RecordingComplete(summary.clone()));
                Ok(Some(summary))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.report_recording_error(&e);
                Err(e)
            }
        }
    }

    fn handle_outcome(&mut self, outcome: TickOutcome) {
        if let Some(e) = outcome.recording_error {
            self.report_recording_error(&e);
        }

        if let Some(message) = outcome.link_error {
            let port = self
                .port
                .as_ref()
                .map_or_else(|| "link".to_string(), |p| p.name.clone());
            tracing::error!("Transport error on {}: {}", port, message);
            self.try_send_message(BackendMessage::TransportError(message));
            if let Err(e) = self.disconnect() {
                tracing::error!("Error while disconnecting after transport failure: {}", e);
            }
        }
    }

    fn report_recording_error(&mut self, error: &LabError) {
        tracing::error!("Recording error: {}", error);
        self.try_send_message(BackendMessage::RecordingError(error.to_string()));
    }

    /// Rate limit the tick loop
    fn rate_limit(&mut self) {
        let elapsed = self.last_tick_time.elapsed();
        if elapsed < self.tick_interval {
            std::thread::sleep(self.tick_interval - elapsed);
        }
        self.last_tick_time = Instant::now();
    }

    /// Update connection status and notify the control surface
    fn update_connection_status(&mut self, status: ConnectionStatus) {
        self.connection_status = status;
        self.try_send_message(BackendMessage::ConnectionStatus(status));
    }

    /// Send statistics (using try_send for backpressure)
    fn send_stats(&mut self) {
        let stats = self.pipeline.stats();
        self.try_send_message(BackendMessage::Stats(stats));
    }

    /// Try to send a message, tracking dropped messages if queue is full
    fn try_send_message(&mut self, msg: BackendMessage) {
        if self.message_tx.try_send(msg).is_err() {
            self.dropped_messages += 1;
        }
    }
}
