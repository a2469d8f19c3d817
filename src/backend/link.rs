//! SerialLink trait for a unified transport interface
//!
//! This module provides the common traits for the byte source the reader
//! thread owns, enabling both real serial ports (via the `serialport` crate)
//! and scripted in-memory links for testing.
//!
//! # Read contract
//!
//! A link is read through [`std::io::Read`] with these conventions:
//!
//! - `Ok(n)` with `n > 0` - bytes arrived
//! - `Err` of kind `TimedOut` or `WouldBlock` - nothing arrived within the
//!   poll interval; the caller should check its stop flag and read again
//! - `Ok(0)` - the link reached end of stream and will not produce more bytes
//! - any other `Err` - the link failed and must be closed

use crate::config::SerialSettings;
use crate::error::Result;
use crate::types::PortId;
use std::io::Read;

/// A byte source owned exclusively by the reader thread
///
/// Implementations must be `Send` so the link can move into the reader
/// thread, and should bound every read by the configured poll interval.
pub trait SerialLink: Read + Send {
    /// Name of the port this link reads from
    fn port_name(&self) -> &str;
}

/// Opens links and enumerates ports
///
/// Shared between the control surface (port listing) and the consumer
/// thread (opening on connect).
pub trait LinkOpener: Send + Sync {
    /// Enumerate ports the operator can choose from
    fn list_ports(&self) -> Result<Vec<PortId>>;

    /// Open a link to a port
    fn open(&self, port: &PortId, settings: &SerialSettings) -> Result<Box<dyn SerialLink>>;
}

/// Whether an IO error just means "no bytes yet"
pub fn is_idle_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_idle_errors() {
        assert!(is_idle_error(&Error::new(ErrorKind::TimedOut, "poll")));
        assert!(is_idle_error(&Error::new(ErrorKind::WouldBlock, "poll")));
        assert!(!is_idle_error(&Error::new(ErrorKind::BrokenPipe, "unplugged")));
        assert!(!is_idle_error(&Error::new(ErrorKind::PermissionDenied, "busy")));
    }
}
