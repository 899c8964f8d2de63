//! Newline framing for the relay stream.
//!
//! Inbound bytes are accumulated in a `BytesMut` and split on `\n`. Only
//! complete lines are returned; a partial line stays in the buffer until the
//! rest of it arrives.

use crate::WireError;
use bytes::{Buf, BytesMut};

/// Maximum inbound line size (64 KiB)
pub const DEFAULT_MAX_LINE_SIZE: usize = 64 * 1024;

/// Prefix marking an inbound line as a command
pub const COMMAND_PREFIX: &str = "cmd:";

/// Line decoder for parsing the inbound stream
#[derive(Debug)]
pub struct LineDecoder {
    max_line_size: usize,
}

impl LineDecoder {
    /// Create a new line decoder
    pub fn new() -> Self {
        Self {
            max_line_size: DEFAULT_MAX_LINE_SIZE,
        }
    }

    /// Create a decoder with a custom line limit
    #[cfg(test)]
    pub fn with_max_line_size(max_line_size: usize) -> Self {
        Self { max_line_size }
    }

    /// Decode one line from a buffer.
    ///
    /// The delimiter (and one `\r` before it, if any) is stripped and the
    /// consumed bytes are removed from `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, WireError> {
        let Some(pos) = buf.iter().position(|b| *b == b'\n') else {
            if buf.len() > self.max_line_size {
                return Err(WireError::LineTooLong(self.max_line_size));
            }
            return Ok(None);
        };

        let raw = buf.split_to(pos);
        buf.advance(1);

        let mut end = raw.len();
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }

        Ok(Some(String::from_utf8_lossy(&raw[..end]).into_owned()))
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Append the delimiter to a line
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len() + 1);
    out.extend_from_slice(line.as_bytes());
    out.push(b'\n');
    out
}

/// Split a command line into lowercase positional arguments.
///
/// Returns `None` when the line does not start with [`COMMAND_PREFIX`]. The
/// remainder is split on single spaces, so repeated spaces yield empty arguments.
pub fn command_args(line: &str) -> Option<Vec<String>> {
    let rest = line.strip_prefix(COMMAND_PREFIX)?;
    Some(rest.to_lowercase().split(' ').map(str::to_string).collect())
}
