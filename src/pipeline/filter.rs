//! Smoothing filter: moving average over the last N raw samples.
//!
//! The window is bounded at construction. During warm-up the mean is taken
//! over however many samples are present, so the first output equals the
//! first sample.

use crate::types::RawSample;
use std::collections::VecDeque;

/// Moving average over a bounded FIFO window of raw samples
#[derive(Debug, Clone)]
pub struct SmoothingFilter {
    window: VecDeque<RawSample>,
    capacity: usize,
    /// Exact running sum of the window
    sum: i128,
}

impl SmoothingFilter {
    /// Create a filter averaging up to `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0,
        }
    }

    /// Add a sample, evicting the oldest at capacity, and return the window mean
    pub fn push(&mut self, sample: RawSample) -> f64 {
        if self.window.len() == self.capacity {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest as i128;
            }
        }
        self.window.push_back(sample);
        self.sum += sample as i128;

        self.sum as f64 / self.window.len() as f64
    }

    /// Mean of the current window, if any samples have been pushed
    pub fn mean(&self) -> Option<f64> {
        if self.window.is_empty() {
            None
        } else {
            Some(self.sum as f64 / self.window.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all samples (new stream)
    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = 0;
    }
}

impl Default for SmoothingFilter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SMOOTHING_WINDOW)
    }
}
