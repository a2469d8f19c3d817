//! Mock construction helpers

use crossbeam_channel::Receiver;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tensile_lab::backend::{LabBackend, LabHandle, MockEnd, MockLink, MockOpener};
use tensile_lab::config::LabConfig;
use tensile_lab::types::ReadingEvent;

/// A link that sends the samples and then reports end of stream
pub fn finite_link(name: &str, samples: &[i64]) -> MockLink {
    MockLink::from_samples(name, samples).with_end(MockEnd::Eof)
}

/// A link that sends the samples and then stays quiet
pub fn quiet_link(name: &str, samples: &[i64]) -> MockLink {
    MockLink::from_samples(name, samples)
}

/// Spawn a backend whose opener hands out the given links
pub fn spawn_backend(config: LabConfig, links: Vec<MockLink>) -> (LabHandle, JoinHandle<()>) {
    let opener = links
        .into_iter()
        .fold(MockOpener::new(), |opener, link| opener.with_link(link));
    let (backend, handle) = LabBackend::with_opener(config, Arc::new(opener));
    let thread = backend.spawn().expect("spawn backend");
    (handle, thread)
}

/// Collect readings until `count` arrived or the test timeout passed
pub fn collect_readings(readings: &Receiver<ReadingEvent>, count: usize) -> Vec<ReadingEvent> {
    let mut collected = Vec::new();
    super::wait_until(|| {
        collected.extend(readings.try_iter());
        collected.len() >= count
    });
    collected
}

/// Record writer that starts failing once `fail_writes` is called
#[derive(Clone, Default)]
pub struct FlakyWriter {
    fail: Arc<AtomicBool>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl FlakyWriter {
    pub fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Everything written before the failure
    pub fn text(&self) -> String {
        String::from_utf8(self.written.lock().unwrap().clone()).unwrap()
    }

    fn check(&self) -> io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
        } else {
            Ok(())
        }
    }
}

impl Write for FlakyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()
    }
}
