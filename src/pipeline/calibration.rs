//! Calibration engine: tare, scale and peak tracking.
//!
//! `force = (smoothed - tare_offset) / effective_factor`
//!
//! The tare offset and calibration factor are shared between the consumer
//! thread (which converts every sample) and the control surface (which the
//! operator drives). Both live behind one mutex in [`SharedCalibration`], so
//! a conversion always sees an offset/factor pair written together, and the
//! last write wins.
//!
//! A factor of zero, a non-finite factor, or operator text that does not
//! parse is replaced with `1.0`. The substitution is not an error, but it is
//! recorded so the UI can show a warning.

use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Factor used in place of an unusable calibration factor
pub const FALLBACK_FACTOR: f64 = 1.0;

/// Why an operator-supplied factor was replaced
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationInputError {
    #[error("calibration factor {0:?} is not a number")]
    NotANumber(String),
    #[error("calibration factor is zero")]
    Zero,
    #[error("calibration factor {0} is not finite")]
    NotFinite(f64),
}

/// Validate a numeric factor, substituting [`FALLBACK_FACTOR`] when unusable
pub fn effective_factor(factor: f64) -> Result<f64, CalibrationInputError> {
    if !factor.is_finite() {
        Err(CalibrationInputError::NotFinite(factor))
    } else if factor == 0.0 {
        Err(CalibrationInputError::Zero)
    } else {
        Ok(factor)
    }
}

/// Parse operator text into a usable factor
pub fn parse_calibration_factor(input: &str) -> Result<f64, CalibrationInputError> {
    let value = input
        .trim()
        .parse::<f64>()
        .map_err(|_| CalibrationInputError::NotANumber(input.to_string()))?;
    effective_factor(value)
}

/// Snapshot of the calibration applied to one conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationState {
    /// Smoothed raw value treated as zero force
    pub tare_offset: f64,
    /// Divisor from raw counts to force units; never zero
    pub calibration_factor: f64,
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self {
            tare_offset: 0.0,
            calibration_factor: crate::config::DEFAULT_CALIBRATION_FACTOR,
        }
    }
}

impl CalibrationState {
    pub fn new(calibration_factor: f64) -> Self {
        Self {
            tare_offset: 0.0,
            calibration_factor: effective_factor(calibration_factor).unwrap_or(FALLBACK_FACTOR),
        }
    }
}

/// Convert a smoothed raw value into force
pub fn convert(smoothed: f64, state: &CalibrationState) -> f64 {
    let factor = effective_factor(state.calibration_factor).unwrap_or(FALLBACK_FACTOR);
    (smoothed - state.tare_offset) / factor
}

#[derive(Debug)]
struct CalibrationInner {
    state: CalibrationState,
    /// Most recent smoothed value seen by the consumer
    last_smoothed: Option<f64>,
    /// Set when the last factor update was replaced by the fallback
    factor_substituted: bool,
}

/// Calibration state shared between the consumer and the control surface
#[derive(Debug, Clone)]
pub struct SharedCalibration {
    inner: Arc<Mutex<CalibrationInner>>,
}

impl Default for SharedCalibration {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CALIBRATION_FACTOR)
    }
}

impl SharedCalibration {
    /// Create shared state with an initial factor
    pub fn new(calibration_factor: f64) -> Self {
        let checked = effective_factor(calibration_factor);
        if let Err(e) = &checked {
            tracing::warn!("Initial {}, using {}", e, FALLBACK_FACTOR);
        }
        Self {
            inner: Arc::new(Mutex::new(CalibrationInner {
                state: CalibrationState {
                    tare_offset: 0.0,
                    calibration_factor: checked.clone().unwrap_or(FALLBACK_FACTOR),
                },
                last_smoothed: None,
                factor_substituted: checked.is_err(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CalibrationInner> {
        // A panicking holder cannot leave the two plain floats half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current offset/factor pair
    pub fn snapshot(&self) -> CalibrationState {
        self.lock().state
    }

    /// Record a smoothed value and convert it under the same lock
    ///
    /// Called by the consumer for every sample, so a concurrent tare either
    /// lands before this sample (and zeroes it) or after it.
    pub fn observe_and_convert(&self, smoothed: f64) -> f64 {
        let mut inner = self.lock();
        inner.last_smoothed = Some(smoothed);
        convert(smoothed, &inner.state)
    }

    /// Zero the output at the current smoothed input
    ///
    /// Returns the new offset, or `None` if no sample has been seen yet, in
    /// which case the offset is left unchanged.
    pub fn tare(&self) -> Option<f64> {
        let mut inner = self.lock();
        let offset = inner.last_smoothed?;
        inner.state.tare_offset = offset;
        tracing::info!("Tared at smoothed raw value {:.2}", offset);
        Some(offset)
    }

    /// Clear the tare offset
    pub fn clear_tare(&self) {
        self.lock().state.tare_offset = 0.0;
    }

    /// Set the calibration factor, substituting the fallback if unusable
    ///
    /// Returns the factor now in effect.
    pub fn set_calibration_factor(&self, factor: f64) -> f64 {
        self.apply_factor(effective_factor(factor))
    }

    /// Set the calibration factor from operator text
    pub fn set_calibration_factor_input(&self, input: &str) -> f64 {
        self.apply_factor(parse_calibration_factor(input))
    }

    fn apply_factor(&self, checked: Result<f64, CalibrationInputError>) -> f64 {
        let mut inner = self.lock();
        match checked {
            Ok(factor) => {
                inner.state.calibration_factor = factor;
                inner.factor_substituted = false;
                tracing::debug!("Calibration factor set to {}", factor);
            }
            Err(e) => {
                tracing::warn!("{}, using {}", e, FALLBACK_FACTOR);
                inner.state.calibration_factor = FALLBACK_FACTOR;
                inner.factor_substituted = true;
            }
        }
        inner.state.calibration_factor
    }

    /// Whether the factor in effect is the fallback for unusable input
    pub fn factor_substituted(&self) -> bool {
        self.lock().factor_substituted
    }

    /// Most recent smoothed value the consumer saw
    pub fn last_smoothed(&self) -> Option<f64> {
        self.lock().last_smoothed
    }

    /// Forget the last smoothed value (new stream)
    pub fn reset_observation(&self) {
        self.lock().last_smoothed = None;
    }
}

/// Largest absolute force since the current session started
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeakTracker {
    peak: f64,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a force value in; returns true if it set a new peak
    pub fn update(&mut self, force: f64) -> bool {
        let magnitude = force.abs();
        if magnitude > self.peak {
            self.peak = magnitude;
            true
        } else {
            false
        }
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn reset(&mut self) {
        self.peak = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_convert_example_scenario() {
        let state = CalibrationState::new(2180.0);
        let forces: Vec<f64> = [2180.0, 2180.0, 2906.666_666_7]
            .iter()
            .map(|&s| convert(s, &state))
            .collect();
        assert!((forces[0] - 1.0).abs() < 1e-9);
        assert!((forces[1] - 1.0).abs() < 1e-9);
        assert_eq!(format!("{:.2}", forces[2]), "1.33");
    }

    #[test]
    fn test_zero_and_garbage_factor_fall_back() {
        assert_eq!(effective_factor(0.0), Err(CalibrationInputError::Zero));
        assert!(effective_factor(f64::NAN).is_err());
        assert!(parse_calibration_factor("abc").is_err());
        assert_eq!(parse_calibration_factor(" 2180.0 "), Ok(2180.0));

        let zero = CalibrationState {
            tare_offset: 0.0,
            calibration_factor: 0.0,
        };
        assert_eq!(convert(42.0, &zero), 42.0);
    }

    #[test]
    fn test_tare_zeroes_current_value() {
        let cal = SharedCalibration::new(2180.0);
        assert_eq!(cal.tare(), None);

        let before = cal.observe_and_convert(5000.0);
        assert!(before > 0.0);

        assert_eq!(cal.tare(), Some(5000.0));
        assert!(cal.observe_and_convert(5000.0).abs() < 1e-12);
        assert!((cal.observe_and_convert(7180.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_substitution_is_observable() {
        let cal = SharedCalibration::new(2180.0);
        assert!(!cal.factor_substituted());

        assert_eq!(cal.set_calibration_factor_input("twenty"), FALLBACK_FACTOR);
        assert!(cal.factor_substituted());
        assert_eq!(cal.observe_and_convert(3.0), 3.0);

        assert_eq!(cal.set_calibration_factor(100.0), 100.0);
        assert!(!cal.factor_substituted());

        assert_eq!(cal.set_calibration_factor(0.0), FALLBACK_FACTOR);
        assert!(cal.factor_substituted());
    }

    #[test]
    fn test_initial_zero_factor() {
        let cal = SharedCalibration::new(0.0);
        assert!(cal.factor_substituted());
        assert_eq!(cal.snapshot().calibration_factor, FALLBACK_FACTOR);
    }

    #[test]
    fn test_concurrent_updates_never_tear() {
        let cal = SharedCalibration::new(1.0);
        cal.observe_and_convert(10.0);

        let writer = {
            let cal = cal.clone();
            std::thread::spawn(move || {
                for i in 1..500 {
                    cal.set_calibration_factor(i as f64);
                    cal.tare();
                }
            })
        };

        for _ in 0..500 {
            let state = cal.snapshot();
            assert!(state.calibration_factor != 0.0);
            assert!(state.tare_offset == 0.0 || state.tare_offset == 10.0);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_peak_tracker() {
        let mut peak = PeakTracker::new();
        assert!(peak.update(1.0));
        assert!(peak.update(-1.5));
        assert!(!peak.update(1.2));
        assert_eq!(peak.peak(), 1.5);
        peak.reset();
        assert_eq!(peak.peak(), 0.0);
    }

    proptest! {
        #[test]
        fn test_tare_idempotent(smoothed in -1.0e7f64..1.0e7, factor in 1.0f64..5000.0) {
            let cal = SharedCalibration::new(factor);
            cal.observe_and_convert(smoothed);
            cal.tare();
            prop_assert!(cal.observe_and_convert(smoothed).abs() < 1e-9);
        }

        #[test]
        fn test_peak_monotonic(forces in prop::collection::vec(-100.0f64..100.0, 0..50)) {
            let mut peak = PeakTracker::new();
            let mut previous = 0.0;
            for f in forces {
                peak.update(f);
                prop_assert!(peak.peak() >= previous);
                prop_assert!(peak.peak() >= f.abs());
                previous = peak.peak();
            }
        }

        #[test]
        fn test_unusable_input_equals_unit_factor(smoothed in -1.0e6f64..1.0e6, text in "[a-z]{1,8}") {
            let cal = SharedCalibration::new(2180.0);
            cal.set_calibration_factor_input(&text);
            prop_assert_eq!(cal.observe_and_convert(smoothed), smoothed);
        }
    }
}
