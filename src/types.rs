//! Core data types for Tensile Lab
//!
//! This module contains the values that flow through the acquisition
//! pipeline, from the raw sensor integer to the immutable reading that
//! observers and the recorder consume.
//!
//! # Main Types
//!
//! - [`RawSample`] - Signed integer reading as reported by the load cell
//! - [`TimedSample`] - A raw sample stamped with its arrival instant
//! - [`Reading`] - Elapsed time and calibrated force, the unit of display and recording
//! - [`ReadingEvent`] - A reading plus the context observers need (sequence, raw, peak)
//! - [`ConnectionStatus`] - Link state machine
//! - [`AcquisitionStats`] - Counters published periodically to the UI

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Signed raw reading as reported by the sensor
pub type RawSample = i64;

/// A raw sample stamped by the reader thread when its line was framed
///
/// Stamping at the reader keeps the timing of valid samples independent of
/// how long the consumer takes to get to them and of any discarded lines
/// in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    /// Value parsed from the line
    pub value: RawSample,
    /// When the line was framed
    pub captured_at: Instant,
}

impl TimedSample {
    /// Stamp a sample with the current instant
    pub fn now(value: RawSample) -> Self {
        Self {
            value,
            captured_at: Instant::now(),
        }
    }
}

/// One converted force reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Seconds since the reference instant (stream start or session start)
    pub elapsed_secs: f64,
    /// Calibrated force in kilograms
    pub force: f64,
}

impl Reading {
    pub fn new(elapsed_secs: f64, force: f64) -> Self {
        Self {
            elapsed_secs,
            force,
        }
    }

    /// Plot point in `[x, y]` form
    pub fn as_point(&self) -> [f64; 2] {
        [self.elapsed_secs, self.force]
    }
}

/// A reading as published to observers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingEvent {
    /// Zero-based index of the accepted sample since the stream started
    pub sequence: u64,
    /// Elapsed time is relative to the stream start
    pub reading: Reading,
    /// The unsmoothed sample this reading was derived from
    pub raw: RawSample,
    /// Mean of the smoothing window after this sample
    pub smoothed: f64,
    /// Peak magnitude including this reading
    pub peak: f64,
    /// When the reader framed the sample
    pub captured_at: Instant,
}

/// Identifies a serial port the operator can connect to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId {
    /// OS device name, e.g. `/dev/ttyACM0` or `COM4`
    pub name: String,
    /// Human readable description when the OS provides one
    #[serde(default)]
    pub description: Option<String>,
}

impl PortId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{} ({})", self.name, desc),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Represents the connection status of the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No link open
    #[default]
    Disconnected,
    /// Opening the link
    Connecting,
    /// Link open and the reader thread is running
    Streaming,
}

impl ConnectionStatus {
    pub fn is_streaming(&self) -> bool {
        matches!(self, ConnectionStatus::Streaming)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Streaming => write!(f, "Streaming"),
        }
    }
}

/// Statistics about the acquisition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionStats {
    /// Lines that parsed into samples
    pub samples_accepted: u64,
    /// Lines discarded by the parser
    pub malformed_lines: u64,
    /// Unterminated runs longer than the line limit, discarded by the framer
    pub oversized_lines: u64,
    /// Readings published to observers
    pub readings_published: u64,
    /// Readings a display observer could not take because its queue was full
    pub dropped_display: u64,
    /// Times the reader waited on a full sample channel
    pub backpressure_waits: u64,
    /// Rows written to the active record file
    pub rows_recorded: u64,
}

impl AcquisitionStats {
    /// Fraction of framed lines that carried a sample, as a percentage
    pub fn acceptance_rate(&self) -> f64 {
        let total = self.samples_accepted + self.malformed_lines;
        if total == 0 {
            100.0
        } else {
            (self.samples_accepted as f64 / total as f64) * 100.0
        }
    }
}
