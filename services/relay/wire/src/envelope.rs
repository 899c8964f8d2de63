//! Status envelopes and payload encoders.
//!
//! Structured replies wrap a `command:result` pair together with the current
//! connectivity and sensor states. Measurements from the sensor use a compact
//! binary encoding so they fit the low-bandwidth link.

use crate::WireError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Command/result pair carried by a structured reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    /// Command name the reply refers to
    pub command: String,
    /// Outcome (`OK`, `KO`, or an echoed value)
    pub result: Option<String>,
}

/// Structured status reply sent with tag `2`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEnvelope {
    /// Command and result
    pub info: StatusInfo,
    /// Connectivity manager state at send time
    pub connectivity_state: String,
    /// Sensor subsystem state at send time
    pub sensor_state: String,
}

impl StatusEnvelope {
    /// Build an envelope from a `command:result` message
    pub fn from_message(
        message: &str,
        connectivity_state: impl Into<String>,
        sensor_state: impl Into<String>,
    ) -> Self {
        let (command, result) = match message.split_once(':') {
            Some((command, result)) => (command.to_string(), Some(result.to_string())),
            None => (message.to_string(), None),
        };

        Self {
            info: StatusInfo { command, result },
            connectivity_state: connectivity_state.into(),
            sensor_state: sensor_state.into(),
        }
    }
}

/// One processed measurement emitted by the sensor subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// Acquisition timestamp as reported by the sensor
    pub date: String,
    /// Signal strengths of the devices detected during the period
    pub signal_strengths: Vec<i16>,
}

/// Encoder for structured status envelopes
#[async_trait]
pub trait EnvelopeEncoder: Send + Sync {
    /// Encode an envelope into a transport-safe string
    async fn encode(&self, envelope: &StatusEnvelope) -> Result<String, WireError>;
}

/// Encoder for processed measurements
#[async_trait]
pub trait MeasurementEncoder: Send + Sync {
    /// Encode a batch of measurements into a transport-safe string
    async fn encode(&self, measurements: &[Measurement]) -> Result<String, WireError>;
}

/// Compact JSON envelope encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnvelopeEncoder;

#[async_trait]
impl EnvelopeEncoder for JsonEnvelopeEncoder {
    async fn encode(&self, envelope: &StatusEnvelope) -> Result<String, WireError> {
        Ok(serde_json::to_string(envelope)?)
    }
}

/// CBOR + base64 measurement encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct CborMeasurementEncoder;

impl CborMeasurementEncoder {
    /// Decode a body produced by this encoder
    pub fn decode(body: &str) -> Result<Vec<Measurement>, WireError> {
        let raw = STANDARD
            .decode(body)
            .map_err(|e| WireError::Measurement(e.to_string()))?;
        ciborium::from_reader(raw.as_slice()).map_err(|e| WireError::Measurement(e.to_string()))
    }
}

#[async_trait]
impl MeasurementEncoder for CborMeasurementEncoder {
    async fn encode(&self, measurements: &[Measurement]) -> Result<String, WireError> {
        let mut buf = Vec::new();
        ciborium::into_writer(&measurements, &mut buf)
            .map_err(|e| WireError::Measurement(e.to_string()))?;
        Ok(STANDARD.encode(buf))
    }
}
