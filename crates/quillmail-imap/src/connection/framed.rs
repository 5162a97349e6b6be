//! Line framing for IMAP responses.
//!
//! Server responses are CRLF-terminated lines. Bytes arrive in arbitrary
//! chunks; [`LineReassembler`] carries partial lines across chunk boundaries
//! and yields each complete line in order.
//!
//! Literal payloads (`{n}` followed by `n` raw bytes) are not length-aware
//! here: a literal announcement is detectable with [`literal_length`], but its
//! payload is framed like any other text.

use bytes::{Buf, BytesMut};

use crate::{Error, Result};

/// Default buffer size for reading.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Turns received byte chunks into CRLF-delimited lines.
#[derive(Debug)]
pub struct LineReassembler {
    buffer: BytesMut,
    max_line_length: usize,
}

impl LineReassembler {
    /// Creates an empty reassembler.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Creates an empty reassembler with a custom line length limit.
    #[must_use]
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            max_line_length,
        }
    }

    /// Appends a received chunk.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the carried-over partial line grows past
    /// the line length limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > self.max_line_length && find_crlf(&self.buffer).is_none() {
            return Err(Error::Protocol("line too long".to_string()));
        }
        Ok(())
    }

    /// Removes and returns the next complete line without its CRLF, with
    /// surrounding ASCII whitespace trimmed.
    ///
    /// Bytes map one-to-one onto characters (Latin-1), so arbitrary server
    /// bytes never fail to decode.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = find_crlf(&self.buffer)?;
        let line = self.buffer.split_to(pos);
        self.buffer.advance(2);
        let text: String = line.iter().copied().map(char::from).collect();
        Some(text.trim_matches(|c: char| c.is_ascii_whitespace()).to_string())
    }

    /// Drains every complete line currently buffered, lazily and in order.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { reassembler: self }
    }

    /// Number of bytes held for an incomplete line.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineReassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the complete lines of a [`LineReassembler`].
#[derive(Debug)]
pub struct Lines<'a> {
    reassembler: &'a mut LineReassembler,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.reassembler.next_line()
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line.
///
/// Matches lines ending in `{123}` or `{123+}` (non-synchronizing).
#[must_use]
pub fn literal_length(line: &str) -> Option<usize> {
    let open = line.rfind('{')?;
    let inner = line[open + 1..].strip_suffix('}')?;
    let digits = inner.strip_suffix('+').unwrap_or(inner);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
