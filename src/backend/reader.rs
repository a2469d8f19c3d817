//! Reader thread
//!
//! The reader owns the link for the whole connection. It frames lines,
//! parses them, and pushes accepted samples into the bounded sample channel.
//! A full channel makes the reader wait in short `send_timeout` slices; it
//! never drops a sample, and it re-checks the stop flag only between
//! samples so a sample that was parsed is always handed over.
//!
//! The thread ends when the stop flag is raised, when the link fails, or
//! when the consumer side of the channel goes away. In every case the link
//! is dropped exactly once, when the thread's closure returns.

use crate::backend::framer::LineFramer;
use crate::backend::link::SerialLink;
use crate::error::{LabError, Result};
use crate::pipeline::parser::parse_sample;
use crate::types::TimedSample;
use crossbeam_channel::{SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// What the reader hands to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A parsed sample, stamped when its line was framed
    Sample(TimedSample),
    /// The link failed or reached end of stream
    Closed(String),
}

/// Counters shared between the reader thread and the consumer
#[derive(Debug, Clone, Default)]
pub struct ReaderStats {
    accepted: Arc<AtomicU64>,
    malformed: Arc<AtomicU64>,
    oversized: Arc<AtomicU64>,
    backpressure_waits: Arc<AtomicU64>,
}

impl ReaderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Unterminated runs the framer threw away
    pub fn oversized(&self) -> u64 {
        self.oversized.load(Ordering::Relaxed)
    }

    pub fn backpressure_waits(&self) -> u64 {
        self.backpressure_waits.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.accepted.store(0, Ordering::Relaxed);
        self.malformed.store(0, Ordering::Relaxed);
        self.oversized.store(0, Ordering::Relaxed);
        self.backpressure_waits.store(0, Ordering::Relaxed);
    }
}

/// Reader thread settings
#[derive(Debug, Clone, Copy)]
pub struct ReaderConfig {
    /// Longest unterminated run the framer buffers
    pub max_line_len: usize,
    /// Slice the reader waits on a full channel before re-trying
    pub backpressure_wait: Duration,
}

/// Handle to a running reader thread
#[derive(Debug)]
pub struct ReaderHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    port_name: String,
}

impl ReaderHandle {
    /// Ask the reader to exit after the current poll
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Wait for the reader thread to exit
    ///
    /// The caller must keep draining the sample channel until
    /// [`is_finished`](Self::is_finished) turns true, otherwise a reader
    /// blocked on a full channel never observes the stop flag.
    pub fn join(&mut self) {
        if let Some(handle) = self.join.take() {
            if handle.join().is_err() {
                tracing::error!("Reader thread for {} panicked", self.port_name);
            }
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.request_stop();
    }
}

/// Spawn the reader thread for a link
pub fn spawn_reader(
    link: Box<dyn SerialLink>,
    tx: Sender<LinkEvent>,
    config: ReaderConfig,
    stats: ReaderStats,
) -> Result<ReaderHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let port_name = link.port_name().to_string();

    let thread_stop = stop.clone();
    let join = std::thread::Builder::new()
        .name(format!("reader-{}", port_name))
        .spawn(move || run_reader(link, tx, config, stats, thread_stop))
        .map_err(|e| LabError::Transport(format!("Failed to spawn reader thread: {}", e)))?;

    Ok(ReaderHandle {
        stop,
        join: Some(join),
        port_name,
    })
}

fn run_reader(
    link: Box<dyn SerialLink>,
    tx: Sender<LinkEvent>,
    config: ReaderConfig,
    stats: ReaderStats,
    stop: Arc<AtomicBool>,
) {
    let port_name = link.port_name().to_string();
    let mut framer = LineFramer::new(link, config.max_line_len);
    tracing::debug!("Reader started on {}", port_name);

    let closed = loop {
        if stop.load(Ordering::SeqCst) {
            break None;
        }

        let next = framer.next_line();
        stats
            .oversized
            .fetch_add(framer.take_discarded(), Ordering::Relaxed);

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("Link {} failed: {}", port_name, e);
                break Some(e.to_string());
            }
        };

        match parse_sample(&line) {
            Ok(value) => {
                stats.accepted.fetch_add(1, Ordering::Relaxed);
                let event = LinkEvent::Sample(TimedSample::now(value));
                if !send_with_backpressure(&tx, event, &config, &stats) {
                    tracing::debug!("Sample channel closed, reader on {} exiting", port_name);
                    return;
                }
            }
            Err(e) => {
                stats.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("{}", e);
            }
        }
    };

    if let Some(message) = closed {
        send_with_backpressure(&tx, LinkEvent::Closed(message), &config, &stats);
    }
    tracing::debug!("Reader on {} stopped", port_name);
}

/// Send an event, waiting while the channel is full
///
/// Returns false only if the consumer side has gone away.
fn send_with_backpressure(
    tx: &Sender<LinkEvent>,
    mut event: LinkEvent,
    config: &ReaderConfig,
    stats: &ReaderStats,
) -> bool {
    let mut waited = false;
    loop {
        match tx.send_timeout(event, config.backpressure_wait) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => {
                if !waited {
                    stats.backpressure_waits.fetch_add(1, Ordering::Relaxed);
                    waited = true;
                }
                event = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
