//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Inbound line exceeded the decoder limit without a delimiter
    #[error("line exceeds {0} bytes without a delimiter")]
    LineTooLong(usize),

    /// Unknown payload tag character
    #[error("unknown payload tag {0:?}")]
    Tag(char),

    /// Structured envelope could not be serialized
    #[error("envelope encoding failed: {0}")]
    Envelope(#[from] serde_json::Error),

    /// Measurement could not be serialized
    #[error("measurement encoding failed: {0}")]
    Measurement(String),
}
