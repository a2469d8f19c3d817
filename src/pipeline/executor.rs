//! Acquisition pipeline: the consumer side of the reader/consumer boundary.
//!
//! The pipeline owns every stage that runs on the consumer thread. Each
//! tick:
//! 1. Take the samples currently queued by the reader (bounded by the queue
//!    length at the start of the tick, so a fast link cannot starve the
//!    caller).
//! 2. Smooth, convert and fold the peak, in arrival order.
//! 3. Publish the reading to every observer, then record it.
//!
//! Stopping drains whatever the reader had queued before reporting Idle.
//!
//! Reading times count from the stream start, or from the session start
//! while recording, so recorded rows carry the times observers saw.

use crate::backend::link::SerialLink;
use crate::backend::reader::{spawn_reader, LinkEvent, ReaderConfig, ReaderHandle, ReaderStats};
use crate::config::{LabConfig, RecordingSettings};
use crate::error::{LabError, Result};
use crate::pipeline::calibration::{PeakTracker, SharedCalibration};
use crate::pipeline::filter::SmoothingFilter;
use crate::pipeline::observer::ReadingObserver;
use crate::session::{RecordingSession, SessionRecorder, SessionSummary, SummaryLog};
use crate::types::{AcquisitionStats, Reading, ReadingEvent, TimedSample};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Whether the reader thread is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Running,
}

/// What happened during one tick
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Samples turned into readings
    pub processed: usize,
    /// The link failed or ended; the caller should stop the pipeline
    pub link_error: Option<String>,
    /// Recording failed and the session was ended
    pub recording_error: Option<LabError>,
}

impl TickOutcome {
    fn merge(&mut self, other: TickOutcome) {
        self.processed += other.processed;
        if other.link_error.is_some() {
            self.link_error = other.link_error;
        }
        if other.recording_error.is_some() {
            self.recording_error = other.recording_error;
        }
    }
}

/// The acquisition pipeline
pub struct AcquisitionPipeline {
    channel_capacity: usize,
    reader_config: ReaderConfig,
    tick_interval: Duration,
    filter: SmoothingFilter,
    calibration: SharedCalibration,
    peak: PeakTracker,
    observers: Vec<Box<dyn ReadingObserver>>,
    recorder: SessionRecorder,
    rx: Option<Receiver<LinkEvent>>,
    reader: Option<ReaderHandle>,
    reader_stats: ReaderStats,
    time_origin: Instant,
    sequence: u64,
    readings_published: u64,
    rows_recorded: u64,
}

impl AcquisitionPipeline {
    pub fn new(config: &LabConfig, calibration: SharedCalibration) -> Self {
        let acquisition = &config.acquisition;
        Self {
            channel_capacity: acquisition.channel_capacity.max(1),
            reader_config: ReaderConfig {
                max_line_len: config.serial.max_line_len,
                backpressure_wait: acquisition.backpressure_wait(),
            },
            tick_interval: acquisition.tick_interval(),
            filter: SmoothingFilter::new(acquisition.smoothing_window),
            calibration,
            peak: PeakTracker::new(),
            observers: Vec::new(),
            recorder: SessionRecorder::new(),
            rx: None,
            reader: None,
            reader_stats: ReaderStats::new(),
            time_origin: Instant::now(),
            sequence: 0,
            readings_published: 0,
            rows_recorded: 0,
        }
    }

    /// Register an observer; it sees readings from the next sample on
    pub fn add_observer(&mut self, observer: Box<dyn ReadingObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Spawn the reader for a link and start a new stream
    ///
    /// The smoothing window and the tare reference restart with the stream.
    /// The peak does not; it only resets when a recording session begins.
    pub fn start(&mut self, link: Box<dyn SerialLink>) -> Result<()> {
        if let Some(reader) = &self.reader {
            return Err(LabError::AlreadyConnected(reader.port_name().to_string()));
        }

        let (tx, rx) = bounded(self.channel_capacity);
        self.reader_stats.reset();
        let reader = spawn_reader(link, tx, self.reader_config, self.reader_stats.clone())?;
        tracing::info!("Acquisition started on {}", reader.port_name());

        self.filter.clear();
        self.calibration.reset_observation();
        if !self.recorder.is_recording() {
            self.time_origin = Instant::now();
        }
        self.sequence = 0;
        self.rx = Some(rx);
        self.reader = Some(reader);
        Ok(())
    }

    /// Process the samples queued at the start of this call
    pub fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let Some(rx) = self.rx.clone() else {
            return outcome;
        };

        for _ in 0..rx.len() {
            match rx.try_recv() {
                Ok(event) => self.handle_event(event, &mut outcome),
                Err(_) => break,
            }
        }

        if outcome.processed > 0 {
            tracing::trace!("Tick processed {} samples", outcome.processed);
        }
        outcome
    }

    /// Stop the reader, processing everything it queued
    ///
    /// Safe to call when idle. The link is released when the reader thread
    /// exits, before this returns.
    pub fn stop(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let Some(mut reader) = self.reader.take() else {
            return outcome;
        };
        let Some(rx) = self.rx.take() else {
            reader.request_stop();
            reader.join();
            return outcome;
        };

        reader.request_stop();
        // The reader may be waiting on a full channel; keep taking samples
        // until it has seen the stop flag and exited.
        while !reader.is_finished() {
            if let Ok(event) = rx.recv_timeout(self.tick_interval) {
                self.handle_event(event, &mut outcome);
            }
        }
        reader.join();
        outcome.merge(self.drain(&rx));

        tracing::info!(
            "Acquisition stopped on {} ({} samples drained)",
            reader.port_name(),
            outcome.processed
        );
        outcome
    }

    fn drain(&mut self, rx: &Receiver<LinkEvent>) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        loop {
            match rx.try_recv() {
                Ok(event) => self.handle_event(event, &mut outcome),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        outcome
    }

    fn handle_event(&mut self, event: LinkEvent, outcome: &mut TickOutcome) {
        match event {
            LinkEvent::Sample(sample) => {
                if let Err(e) = self.process_sample(sample) {
                    outcome.recording_error = Some(e);
                }
                outcome.processed += 1;
            }
            LinkEvent::Closed(message) => outcome.link_error = Some(message),
        }
    }

    fn process_sample(&mut self, sample: TimedSample) -> Result<()> {
        let smoothed = self.filter.push(sample.value);
        let force = self.calibration.observe_and_convert(smoothed);
        self.peak.update(force);

        let elapsed = sample
            .captured_at
            .saturating_duration_since(self.time_origin)
            .as_secs_f64();
        let event = ReadingEvent {
            sequence: self.sequence,
            reading: Reading::new(elapsed, force),
            raw: sample.value,
            smoothed,
            peak: self.peak.peak(),
            captured_at: sample.captured_at,
        };
        self.sequence += 1;

        for observer in &mut self.observers {
            observer.on_reading(&event);
        }
        self.readings_published += 1;

        if self.recorder.is_recording() {
            self.recorder.record(&event, self.peak.peak())?;
            self.rows_recorded += 1;
        }
        Ok(())
    }

    /// Start a recording session and reset the peak
    ///
    /// Reading times restart at zero with the session.
    pub fn begin_recording(&mut self, label: &str, settings: &RecordingSettings) -> Result<PathBuf> {
        let path = self.recorder.begin(label, settings)?;
        self.session_started();
        Ok(path)
    }

    /// Start recording into an already opened session
    pub fn begin_session(&mut self, session: RecordingSession, summary: SummaryLog) -> Result<PathBuf> {
        let path = self.recorder.begin_session(session, summary)?;
        self.session_started();
        Ok(path)
    }

    fn session_started(&mut self) {
        self.peak.reset();
        self.time_origin = Instant::now();
    }

    /// End the recording session, if one is active
    pub fn end_recording(&mut self) -> Result<Option<SessionSummary>> {
        self.recorder.end(self.peak.peak())
    }

    pub fn calibration(&self) -> &SharedCalibration {
        &self.calibration
    }

    /// Peak magnitude since the current session began
    pub fn peak(&self) -> f64 {
        self.peak.peak()
    }

    pub fn state(&self) -> PipelineState {
        if self.reader.is_some() {
            PipelineState::Running
        } else {
            PipelineState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn recording_path(&self) -> Option<&Path> {
        self.recorder.active_path()
    }

    /// Snapshot of the acquisition counters
    pub fn stats(&self) -> AcquisitionStats {
        AcquisitionStats {
            samples_accepted: self.reader_stats.accepted(),
            malformed_lines: self.reader_stats.malformed(),
            oversized_lines: self.reader_stats.oversized(),
            readings_published: self.readings_published,
            dropped_display: self.observers.iter().map(|o| o.dropped()).sum(),
            backpressure_waits: self.reader_stats.backpressure_waits(),
            rows_recorded: self.rows_recorded,
        }
    }
}

impl Drop for AcquisitionPipeline {
    fn drop(&mut self) {
        self.stop();
        if let Err(e) = self.end_recording() {
            tracing::error!("Failed to close recording on shutdown: {}", e);
        }
    }
}
