//! Test data builders for creating test objects

use std::path::Path;
use std::time::Instant;
use tensile_lab::config::{LabConfig, RecordingSettings, ValueColumn};
use tensile_lab::types::{Reading, ReadingEvent};

/// Builder for test configurations with fast timings
pub struct ConfigBuilder {
    config: LabConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = LabConfig::default();
        config.serial.poll_interval_ms = 2;
        config.acquisition.tick_interval_ms = 1;
        config.acquisition.backpressure_wait_ms = 1;
        config.acquisition.stats_interval_ms = 20;
        Self { config }
    }

    pub fn window(mut self, window: usize) -> Self {
        self.config.acquisition.smoothing_window = window;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.acquisition.channel_capacity = capacity;
        self
    }

    pub fn factor(mut self, factor: f64) -> Self {
        self.config.calibration.factor = factor;
        self
    }

    pub fn save_dir(mut self, dir: &Path) -> Self {
        self.config.recording.save_dir = dir.to_path_buf();
        self
    }

    pub fn raw_column(mut self) -> Self {
        self.config.recording.value_column = ValueColumn::Raw;
        self
    }

    pub fn build(self) -> LabConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Recording settings rooted in a directory
pub fn recording_in(dir: &Path) -> RecordingSettings {
    RecordingSettings::in_dir(dir)
}

/// Builder for reading events
pub struct ReadingEventBuilder {
    event: ReadingEvent,
}

impl ReadingEventBuilder {
    pub fn new(force: f64) -> Self {
        Self {
            event: ReadingEvent {
                sequence: 0,
                reading: Reading::new(0.0, force),
                raw: 0,
                smoothed: 0.0,
                peak: force.abs(),
                captured_at: Instant::now(),
            },
        }
    }

    pub fn sequence(mut self, sequence: u64) -> Self {
        self.event.sequence = sequence;
        self
    }

    pub fn raw(mut self, raw: i64) -> Self {
        self.event.raw = raw;
        self.event.smoothed = raw as f64;
        self
    }

    pub fn elapsed(mut self, secs: f64) -> Self {
        self.event.reading.elapsed_secs = secs;
        self
    }

    pub fn captured_at(mut self, at: Instant) -> Self {
        self.event.captured_at = at;
        self
    }

    pub fn build(self) -> ReadingEvent {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new().window(3).channel_capacity(4).build();
        assert_eq!(config.acquisition.smoothing_window, 3);
        assert_eq!(config.acquisition.channel_capacity, 4);
        assert_eq!(config.calibration.factor, 2180.0);
    }
}
