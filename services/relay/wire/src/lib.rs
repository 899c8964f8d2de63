//! Line framing, payload tags, status envelopes and payload encoders for the relay.
//!
//! This crate provides the low-level wire protocol spoken between the field relay
//! and its control server: a newline-delimited text stream where every outbound
//! line carries a one-character tag identifying how its body was encoded.
//!
//! ## Wire Format
//!
//! ```text
//! relay -> server   phoneNumber=<number>\n        (once, right after connect)
//! relay -> server   <tag><body>\n                  tag: 0 raw, 1 compact, 2 structured
//! server -> relay   cmd:<name> <arg> <arg>...\n    any other line is ignored
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod line;
pub mod message;

// Re-export main types
pub use envelope::{
    CborMeasurementEncoder, EnvelopeEncoder, JsonEnvelopeEncoder, Measurement,
    MeasurementEncoder, StatusEnvelope, StatusInfo,
};
pub use error::WireError;
pub use line::{command_args, encode_line, LineDecoder, COMMAND_PREFIX, DEFAULT_MAX_LINE_SIZE};
pub use message::{OutboundMessage, PayloadTag};
