//! Offline reload of record files
//!
//! Loading is tolerant: a numeric field that is missing or does not parse
//! is read as 0.0 instead of failing the whole file. The number of such
//! fields is reported so a caller can flag a damaged recording.

use std::fs::File;
use std::path::Path;

use crate::config::ValueColumn;
use crate::error::{LabError, Result, ResultExt};
use crate::types::Reading;

use super::types::TIME_COLUMN;

/// A reloaded record file
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRecording {
    /// Rows in file order
    pub readings: Vec<Reading>,
    /// Which value column the file carries
    pub value_column: ValueColumn,
    /// Fields that were missing or unparsable and read as 0.0
    pub garbled_fields: usize,
}

/// Load the readings of a record file
pub fn load_recorded_file(path: impl AsRef<Path>) -> Result<Vec<Reading>> {
    Ok(load_recorded_file_with_report(path)?.readings)
}

/// Load a record file along with its garbled field count
///
/// Only an unreadable or empty file is an error. Missing columns and
/// fields that do not parse are read as 0.0 and counted.
pub fn load_recorded_file_with_report(path: impl AsRef<Path>) -> Result<LoadedRecording> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Opening {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .with_context(|| format!("Reading header of {}", path.display()))?
        .clone();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(LabError::Recording(format!("{} is empty", path.display())));
    }
    let columns = locate_columns(&headers);
    if columns.time.is_none() {
        tracing::warn!("{} has no {} column", path.display(), TIME_COLUMN);
    }

    let mut readings = Vec::new();
    let mut garbled_fields = 0;
    for record in reader.records() {
        let record = record.with_context(|| format!("Reading {}", path.display()))?;
        let mut field = |idx: Option<usize>| -> f64 {
            match idx.and_then(|i| record.get(i)).and_then(|f| f.parse::<f64>().ok()) {
                Some(v) => v,
                None => {
                    garbled_fields += 1;
                    0.0
                }
            }
        };
        let elapsed = field(columns.time);
        let force = field(columns.value);
        readings.push(Reading::new(elapsed, force));
    }

    if garbled_fields > 0 {
        tracing::warn!(
            "{}: {} missing or unparsable fields read as 0.0",
            path.display(),
            garbled_fields
        );
    }
    tracing::debug!("Loaded {} rows from {}", readings.len(), path.display());

    Ok(LoadedRecording {
        readings,
        value_column: columns.value_column,
        garbled_fields,
    })
}

struct Columns {
    time: Option<usize>,
    value: Option<usize>,
    value_column: ValueColumn,
}

/// Column indices from the header row
///
/// A force column wins over a raw column when a file carries both.
fn locate_columns(headers: &csv::StringRecord) -> Columns {
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}') == name)
    };

    let force = ValueColumn::Force;
    let raw = ValueColumn::Raw;
    let (value, value_column) = match position(force.header()) {
        Some(i) => (Some(i), force),
        None => match position(raw.header()) {
            Some(i) => (Some(i), raw),
            None => (None, force),
        },
    };
    Columns {
        time: position(TIME_COLUMN),
        value,
        value_column,
    }
}
