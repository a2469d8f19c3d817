//! Reading observers: the publish side of the pipeline.
//!
//! Observers are called synchronously on the consumer thread, once per
//! reading, in arrival order. They must not block and must not call back
//! into the pipeline. A UI that renders on its own thread registers a
//! [`ChannelObserver`] and drains the receiver at its frame rate.

use crate::types::ReadingEvent;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives every reading the pipeline produces
#[cfg_attr(test, mockall::automock)]
pub trait ReadingObserver: Send {
    /// Called once per reading, in arrival order
    fn on_reading(&mut self, event: &ReadingEvent);

    /// Number of readings this observer had to discard
    fn dropped(&self) -> u64 {
        0
    }
}

/// Forwards readings into a channel without blocking
///
/// Given an unbounded channel it never loses a reading. On a bounded channel
/// that is full, the reading is counted as dropped for this observer only.
/// Recording is unaffected.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<ReadingEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<ReadingEvent>) -> Self {
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared counter of dropped readings
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }
}

impl ReadingObserver for ChannelObserver {
    fn on_reading(&mut self, event: &ReadingEvent) {
        match self.sender.try_send(*event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // Receiver gone: the display closed, nothing to count
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Adapts a closure into an observer
pub struct FnObserver<F>(pub F);

impl<F> ReadingObserver for FnObserver<F>
where
    F: FnMut(&ReadingEvent) + Send,
{
    fn on_reading(&mut self, event: &ReadingEvent) {
        (self.0)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reading;
    use crossbeam_channel::bounded;
    use std::time::Instant;

    fn event(sequence: u64) -> ReadingEvent {
        ReadingEvent {
            sequence,
            reading: Reading::new(sequence as f64 * 0.1, 1.0),
            raw: 2180,
            smoothed: 2180.0,
            peak: 1.0,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn test_channel_observer_counts_drops_when_full() {
        let (tx, rx) = bounded(2);
        let mut observer = ChannelObserver::new(tx);

        for i in 0..5 {
            observer.on_reading(&event(i));
        }

        assert_eq!(observer.dropped(), 3);
        let received: Vec<u64> = rx.try_iter().map(|e| e.sequence).collect();
        assert_eq!(received, vec![0, 1]);
    }

    #[test]
    fn test_channel_observer_unbounded_keeps_everything() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut observer = ChannelObserver::new(tx);

        for i in 0..20_000 {
            observer.on_reading(&event(i));
        }

        assert_eq!(observer.dropped(), 0);
        assert_eq!(rx.try_iter().count(), 20_000);
    }

    #[test]
    fn test_channel_observer_ignores_closed_receiver() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let mut observer = ChannelObserver::new(tx);
        observer.on_reading(&event(0));
        assert_eq!(observer.dropped(), 0);
    }

    #[test]
    fn test_fn_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = FnObserver(|e: &ReadingEvent| seen.push(e.sequence));
            observer.on_reading(&event(7));
            observer.on_reading(&event(8));
        }
        assert_eq!(seen, vec![7, 8]);
    }
}
