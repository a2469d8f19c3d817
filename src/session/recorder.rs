//! Session recorder writing per-sample record files
//!
//! A [`RecordingSession`] owns one open record file. Rows are written in
//! arrival order and flushed one by one, so a crash loses at most the row
//! being written. Each row carries the reading's own elapsed time, so a
//! reloaded file reproduces what observers saw. [`SessionRecorder`] wraps
//! the optional active session and appends the summary row when it ends.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;

use crate::config::{RecordingSettings, ValueColumn};
use crate::error::{LabError, Result, ResultExt};
use crate::types::ReadingEvent;

use super::summary::SummaryLog;
use super::types::{SessionState, SessionSummary, TIME_COLUMN};

/// Destination of a record file's rows
pub type RecordWriter = Box<dyn Write + Send>;

/// One open record file
pub struct RecordingSession {
    label: String,
    path: PathBuf,
    writer: csv::Writer<RecordWriter>,
    value_column: ValueColumn,
    started_at: Instant,
    rows: u64,
}

impl fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSession")
            .field("label", &self.label)
            .field("path", &self.path)
            .field("value_column", &self.value_column)
            .field("rows", &self.rows)
            .finish()
    }
}

impl RecordingSession {
    /// Create (or truncate) the record file and write its header
    pub fn begin(label: &str, settings: &RecordingSettings) -> Result<Self> {
        let label = label.trim();
        if label.is_empty() {
            return Err(LabError::Recording("Session label is empty".to_string()));
        }

        let path = settings.record_path(label);
        let file = File::create(&path)
            .with_context(|| format!("Creating record file {}", path.display()))?;
        Self::with_writer(label, path, Box::new(file), settings.value_column)
    }

    /// Start a session on an already open writer
    ///
    /// `path` names the session in logs and in its summary; nothing is
    /// created there.
    pub fn with_writer(
        label: &str,
        path: impl Into<PathBuf>,
        writer: RecordWriter,
        value_column: ValueColumn,
    ) -> Result<Self> {
        let path = path.into();
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);

        writer
            .write_record([TIME_COLUMN, value_column.header()])
            .with_context(|| format!("Writing header to {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Writing header to {}", path.display()))?;

        tracing::info!("Recording session '{}' to {}", label, path.display());

        Ok(Self {
            label: label.trim().to_string(),
            path,
            writer,
            value_column,
            started_at: Instant::now(),
            rows: 0,
        })
    }

    /// Append one row and flush it
    pub fn record(&mut self, event: &ReadingEvent) -> Result<()> {
        let elapsed = format!("{:.3}", event.reading.elapsed_secs);
        let value = match self.value_column {
            ValueColumn::Force => event.reading.force.to_string(),
            ValueColumn::Raw => event.raw.to_string(),
        };

        self.writer
            .write_record([elapsed, value])
            .with_context(|| format!("Writing to {}", self.path.display()))?;
        self.writer
            .flush()
            .with_context(|| format!("Writing to {}", self.path.display()))?;

        self.rows += 1;
        Ok(())
    }

    /// Flush and close the record file
    pub fn finish(mut self) -> Result<(String, PathBuf, u64, Duration)> {
        self.writer
            .flush()
            .with_context(|| format!("Closing {}", self.path.display()))?;
        let duration = self.elapsed();
        tracing::info!(
            "Session '{}' closed: {} rows in {:.1}s",
            self.label,
            self.rows,
            duration.as_secs_f64()
        );
        Ok((self.label, self.path, self.rows, duration))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Time since the session began
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Holds the active session, if any
#[derive(Debug, Default)]
pub struct SessionRecorder {
    active: Option<ActiveSession>,
}

#[derive(Debug)]
struct ActiveSession {
    session: RecordingSession,
    summary: SummaryLog,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Recording
        } else {
            SessionState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    /// Rows written by the active session
    pub fn rows(&self) -> u64 {
        self.active.as_ref().map_or(0, |a| a.session.rows())
    }

    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.session.path())
    }

    /// Start a session; fails if one is already active
    pub fn begin(&mut self, label: &str, settings: &RecordingSettings) -> Result<PathBuf> {
        self.ensure_idle()?;
        let session = RecordingSession::begin(label, settings)?;
        self.begin_session(session, SummaryLog::new(settings.summary_path()))
    }

    /// Make an opened session the active one
    pub fn begin_session(&mut self, session: RecordingSession, summary: SummaryLog) -> Result<PathBuf> {
        self.ensure_idle()?;
        let path = session.path().to_path_buf();
        self.active = Some(ActiveSession { session, summary });
        Ok(path)
    }

    fn ensure_idle(&self) -> Result<()> {
        match &self.active {
            Some(active) => Err(LabError::Recording(format!(
                "Session '{}' is already recording",
                active.session.label()
            ))),
            None => Ok(()),
        }
    }

    /// Write a row to the active session; no-op when idle
    ///
    /// A write failure ends the session (with its summary row) and is
    /// returned so the caller can report it.
    pub fn record(&mut self, event: &ReadingEvent, peak: f64) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        if let Err(e) = active.session.record(event) {
            tracing::error!("Recording failed, ending session: {}", e);
            if let Err(end_err) = self.end(peak) {
                tracing::error!("Could not close failed session: {}", end_err);
            }
            return Err(e);
        }
        Ok(())
    }

    /// End the active session and append its summary row
    ///
    /// The summary row is attempted even when closing the record file
    /// fails. Returns `Ok(None)` when no session is active.
    pub fn end(&mut self, peak: f64) -> Result<Option<SessionSummary>> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };

        let label = active.session.label().to_string();
        let record_path = active.session.path().to_path_buf();
        let rows = active.session.rows();
        let duration = active.session.elapsed();

        let closed = active.session.finish();
        let completed_at = Local::now();
        let appended = active.summary.append(&label, peak, completed_at);

        match (closed, appended) {
            (Ok(_), Ok(())) => Ok(Some(SessionSummary {
                label,
                record_path,
                peak,
                rows,
                duration,
                completed_at,
            })),
            (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
            (Err(close_err), Err(summary_err)) => {
                tracing::error!("Summary row for '{}' not written: {}", label, summary_err);
                Err(close_err)
            }
        }
    }
}
