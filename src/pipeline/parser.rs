//! Sample parser: turns a framed line into a raw sample.
//!
//! Only lines of the form `Force:<optional whitespace><integer>` carry data.
//! Anything else is noise from the serial link (boot banners, partial lines
//! after a reconnect) and is rejected with [`ParseError::Malformed`], which
//! callers discard without logging above `trace`.

use crate::types::RawSample;
use thiserror::Error;

/// Prefix every data line starts with
pub const SAMPLE_PREFIX: &str = "Force:";

/// Why a line did not parse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed sample line: {0:?}")]
    Malformed(String),
}

/// Parse a framed line into a raw sample
pub fn parse_sample(line: &str) -> Result<RawSample, ParseError> {
    let malformed = || ParseError::Malformed(line.to_string());

    let remainder = line
        .trim()
        .strip_prefix(SAMPLE_PREFIX)
        .ok_or_else(malformed)?
        .trim();

    if remainder.is_empty() {
        return Err(malformed());
    }

    remainder.parse::<RawSample>().map_err(|_| malformed())
}
