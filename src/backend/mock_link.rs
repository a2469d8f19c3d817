//! Mock Link Implementation for Testing
//!
//! This module provides an in-memory serial link that can be used to run
//! the acquisition pipeline without a load cell attached.
//!
//! # Features
//!
//! - **Scripted bytes**: queue chunks up front with [`MockLink::scripted`]
//! - **Live feeding**: push bytes from another thread through a [`MockFeeder`]
//! - **End behaviour**: stay idle, report end of stream, or fail with an IO error
//!   once the script runs out
//! - **Release tracking**: count how many times a link was dropped
//!
//! # Example
//!
//! ```ignore
//! use tensile_lab::backend::mock_link::{MockLink, MockOpener};
//!
//! let (feeder, link) = MockLink::channel("mock0");
//! let opener = MockOpener::new().with_link(link);
//!
//! feeder.send_line("Force: 2180");
//! ```

use crate::backend::link::{LinkOpener, SerialLink};
use crate::config::SerialSettings;
use crate::error::{LabError, Result};
use crate::types::PortId;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::io::{Error as IoError, ErrorKind, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a link does once its scripted bytes are consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockEnd {
    /// Keep timing out as if the device were quiet
    #[default]
    Idle,
    /// Report end of stream
    Eof,
    /// Fail with an IO error of this kind
    Fail(ErrorKind),
}

/// Sends bytes into a live [`MockLink`]
#[derive(Debug, Clone)]
pub struct MockFeeder {
    sender: Sender<Vec<u8>>,
}

impl MockFeeder {
    pub fn send_bytes(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.sender.send(bytes.into()).is_ok()
    }

    /// Send a line terminated like the firmware does (`\r\n`)
    pub fn send_line(&self, line: &str) -> bool {
        self.send_bytes(format!("{}\r\n", line))
    }

    /// Send a `Force:` sample line
    pub fn send_sample(&self, value: i64) -> bool {
        self.send_line(&format!("Force: {}", value))
    }
}

/// In-memory serial link
#[derive(Debug)]
pub struct MockLink {
    name: String,
    pending: VecDeque<u8>,
    script: VecDeque<Vec<u8>>,
    feed: Option<Receiver<Vec<u8>>>,
    end: MockEnd,
    poll_interval: Duration,
    releases: Arc<AtomicUsize>,
}

impl MockLink {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pending: VecDeque::new(),
            script: VecDeque::new(),
            feed: None,
            end: MockEnd::Idle,
            poll_interval: Duration::from_millis(5),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A link that yields the given chunks, one per read
    pub fn scripted<I, B>(name: &str, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        let mut link = Self::new(name);
        link.script = chunks.into_iter().map(Into::into).collect();
        link
    }

    /// A link that yields `Force:` lines for each value
    pub fn from_samples(name: &str, values: &[i64]) -> Self {
        Self::scripted(name, values.iter().map(|v| format!("Force: {}\r\n", v)))
    }

    /// A link fed live from a [`MockFeeder`]
    pub fn channel(name: &str) -> (MockFeeder, Self) {
        let (tx, rx) = unbounded();
        let mut link = Self::new(name);
        link.feed = Some(rx);
        (MockFeeder { sender: tx }, link)
    }

    /// Set what happens after the script runs out
    pub fn with_end(mut self, end: MockEnd) -> Self {
        self.end = end;
        self
    }

    /// Set how long an idle read waits before timing out
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Counter incremented when the link is dropped
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }

    fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        if let Some(chunk) = self.script.pop_front() {
            return Ok(Some(chunk));
        }

        if let Some(feed) = &self.feed {
            return match feed.recv_timeout(self.poll_interval) {
                Ok(chunk) => Ok(Some(chunk)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => self.finish(),
            };
        }

        self.finish()
    }

    fn finish(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        match self.end {
            MockEnd::Idle => {
                std::thread::sleep(self.poll_interval);
                Ok(None)
            }
            MockEnd::Eof => Ok(Some(Vec::new())),
            MockEnd::Fail(kind) => Err(IoError::new(kind, "mock link failure")),
        }
    }
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            match self.next_chunk()? {
                Some(chunk) if chunk.is_empty() => return Ok(0),
                Some(chunk) => self.pending.extend(chunk),
                None => return Err(IoError::new(ErrorKind::TimedOut, "no bytes")),
            }
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl SerialLink for MockLink {
    fn port_name(&self) -> &str {
        &self.name
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out queued mock links in order
#[derive(Debug, Default)]
pub struct MockOpener {
    ports: Vec<PortId>,
    links: Mutex<VecDeque<MockLink>>,
    opened: AtomicUsize,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a link for the next `open` call; its port becomes listable
    pub fn with_link(mut self, link: MockLink) -> Self {
        let port = PortId::new(link.port_name()).with_description("Mock");
        if !self.ports.contains(&port) {
            self.ports.push(port);
        }
        self.links
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(link);
        self
    }

    /// Number of links opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl LinkOpener for MockOpener {
    fn list_ports(&self) -> Result<Vec<PortId>> {
        Ok(self.ports.clone())
    }

    fn open(&self, port: &PortId, _settings: &SerialSettings) -> Result<Box<dyn SerialLink>> {
        let mut links = self
            .links
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let index = links
            .iter()
            .position(|l| l.port_name() == port.name)
            .ok_or_else(|| LabError::Connect {
                port: port.name.clone(),
                message: "No such mock port".to_string(),
            })?;

        let link = links.remove(index).ok_or_else(|| LabError::Connect {
            port: port.name.clone(),
            message: "No such mock port".to_string(),
        })?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(link))
    }
}
