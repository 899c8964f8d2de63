//! Outbound message representation.
//!
//! Every line sent after the identification handshake starts with a single
//! tag character telling the server how to decode the rest of the line.

use crate::WireError;
use std::fmt;

/// Payload encoding tag prefixed to every outbound line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadTag {
    /// Body is the message text verbatim
    Raw,
    /// Body is a compact-encoded sensor measurement
    Compact,
    /// Body is an encoded status envelope
    Structured,
}

impl PayloadTag {
    /// Tag character as written on the wire
    pub fn as_char(self) -> char {
        match self {
            PayloadTag::Raw => '0',
            PayloadTag::Compact => '1',
            PayloadTag::Structured => '2',
        }
    }

    /// Parse a tag character
    #[cfg(any(test, feature = "testing"))]
    pub fn from_char(c: char) -> Result<Self, WireError> {
        match c {
            '0' => Ok(PayloadTag::Raw),
            '1' => Ok(PayloadTag::Compact),
            '2' => Ok(PayloadTag::Structured),
            other => Err(WireError::Tag(other)),
        }
    }
}

impl fmt::Display for PayloadTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A pre-encoded message waiting to be written to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    tag: PayloadTag,
    body: String,
}

impl OutboundMessage {
    /// Create a message with an explicit tag
    pub fn new(tag: PayloadTag, body: impl Into<String>) -> Self {
        Self {
            tag,
            body: body.into(),
        }
    }

    /// Create a raw (`0`) message
    pub fn raw(body: impl Into<String>) -> Self {
        Self::new(PayloadTag::Raw, body)
    }

    /// Create a compact-encoded (`1`) message
    pub fn compact(body: impl Into<String>) -> Self {
        Self::new(PayloadTag::Compact, body)
    }

    /// Create a structured (`2`) message
    pub fn structured(body: impl Into<String>) -> Self {
        Self::new(PayloadTag::Structured, body)
    }

    /// Payload tag
    pub fn tag(&self) -> PayloadTag {
        self.tag
    }

    /// Encoded body, without tag
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Tagged line content, without the trailing delimiter
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(self.body.len() + 1);
        line.push(self.tag.as_char());
        line.push_str(&self.body);
        line
    }

    /// Parse a tagged line back into a message
    #[cfg(any(test, feature = "testing"))]
    pub fn from_line(line: &str) -> Result<Self, WireError> {
        let mut chars = line.chars();
        let tag = chars.next().ok_or(WireError::Tag('\0'))?;
        Ok(Self::new(PayloadTag::from_char(tag)?, chars.as_str()))
    }
}
