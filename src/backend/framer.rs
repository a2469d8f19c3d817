//! Line framer: splits the link's byte stream into text lines.
//!
//! Both `\n` and `\r` terminate a line, so the firmware's `\r\n` endings
//! and bare carriage returns frame the same way; the empty line between a
//! `\r` and its `\n` is skipped. Invalid UTF-8 sequences are dropped
//! from the line rather than rejecting it. A run of bytes longer than
//! `max_line_len` without a terminator is discarded so a babbling link
//! cannot grow the buffer without bound.

use crate::backend::link::is_idle_error;
use std::io::{ErrorKind, Read};

const READ_CHUNK: usize = 256;

/// Frames lines from a byte source
#[derive(Debug)]
pub struct LineFramer<R> {
    reader: R,
    buffer: Vec<u8>,
    max_line_len: usize,
    discarded: u64,
}

impl<R: Read> LineFramer<R> {
    pub fn new(reader: R, max_line_len: usize) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(READ_CHUNK),
            max_line_len: max_line_len.max(1),
            discarded: 0,
        }
    }

    /// Next complete line, if one is available within one poll interval
    ///
    /// `Ok(None)` means the link had no complete line yet; call again.
    /// End of stream is reported as an `UnexpectedEof` error.
    pub fn next_line(&mut self) -> std::io::Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; READ_CHUNK];
        match self.reader.read(&mut chunk) {
            Ok(0) => Err(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "link closed by device",
            )),
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                let line = self.take_line();
                if line.is_none() && self.buffer.len() > self.max_line_len {
                    tracing::trace!("Discarding {} unterminated bytes", self.buffer.len());
                    self.buffer.clear();
                    self.discarded += 1;
                }
                Ok(line)
            }
            Err(e) if is_idle_error(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Pop the first non-empty terminated line from the buffer
    fn take_line(&mut self) -> Option<String> {
        loop {
            let end = self.buffer.iter().position(|&b| b == b'\n' || b == b'\r')?;
            let line: Vec<u8> = self.buffer.drain(..=end).take(end).collect();
            if !line.is_empty() {
                let text = String::from_utf8_lossy(&line);
                return Some(text.replace(char::REPLACEMENT_CHARACTER, ""));
            }
        }
    }

    /// Oversized runs discarded since the last call
    pub fn take_discarded(&mut self) -> u64 {
        std::mem::take(&mut self.discarded)
    }
}
