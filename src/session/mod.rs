//! Session recording and reload module
//!
//! A session is one bounded period of recording, from `begin_recording`
//! to `end_recording`. While active, every reading is written as a row of
//! the session's record file. Ending a session appends one row to the
//! aggregate summary file of the save directory.
//!
//! # Files
//!
//! - Record file: `Time_Sec,Force_Kg` (or `Time_Sec,Raw_Force`), one row
//!   per reading, truncated at session start
//! - Summary file: `Filename,Peak_Force_Kg,Date_Time`, append-only

pub mod player;
pub mod recorder;
pub mod summary;
pub mod types;

pub use player::{load_recorded_file, load_recorded_file_with_report, LoadedRecording};
pub use recorder::{RecordWriter, RecordingSession, SessionRecorder};
pub use summary::SummaryLog;
pub use types::{SessionState, SessionSummary};
