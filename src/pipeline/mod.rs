//! Sample processing pipeline.
//!
//! Raw samples flow through fixed stages on the consumer thread:
//!
//! ```text
//! "Force: 2180" ─► [parser] ─► RawSample ─► [filter] ─► smoothed
//!                                                         │
//!          observers ◄── ReadingEvent ◄── [calibration: tare, scale, peak]
//!          recorder  ◄──┘
//! ```
//!
//! # Design
//!
//! - **Pure stages**: parser, filter and conversion are plain functions and
//!   structs with no threading of their own.
//! - **One shared value**: the calibration state is the only thing the
//!   control surface mutates while the pipeline runs.
//! - **Observers are synchronous**: called in arrival order on the consumer
//!   thread; slow consumers should use a [`ChannelObserver`].

pub mod calibration;
pub mod executor;
pub mod filter;
pub mod observer;
pub mod parser;

pub use calibration::{
    convert, effective_factor, parse_calibration_factor, CalibrationInputError, CalibrationState,
    PeakTracker, SharedCalibration,
};
pub use executor::{AcquisitionPipeline, PipelineState, TickOutcome};
pub use filter::SmoothingFilter;
pub use observer::{ChannelObserver, FnObserver, ReadingObserver};
pub use parser::{parse_sample, ParseError, SAMPLE_PREFIX};
