//! Outbound message shaping.
//!
//! Every reply to the server goes through one of two paths: clear text sent
//! as-is under tag `0`, or a status envelope carrying the current
//! connectivity and sensor states, encoded and sent under tag `2`. Sensor
//! measurements are encoded in compact form under tag `1`.

use crate::subsystems::{Connectivity, Sensor};
use async_trait::async_trait;
use relay_session::SessionHandle;
use relay_wire::{
    CborMeasurementEncoder, EnvelopeEncoder, JsonEnvelopeEncoder, Measurement,
    MeasurementEncoder, OutboundMessage, StatusEnvelope,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// How a reply is encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEncoding {
    /// Sent as-is with the raw tag
    Clear,
    /// Wrapped in a status envelope with the structured tag
    Generic,
}

/// Sink for command replies and notifications
#[async_trait]
pub trait Replier: Send + Sync {
    /// Send a reply. Failures are logged, never returned.
    async fn reply(&self, message: &str, encoding: ReplyEncoding);
}

/// Encoders used for the structured and compact payloads
#[derive(Clone)]
pub struct Encoders {
    /// Status envelope encoder
    pub envelope: Arc<dyn EnvelopeEncoder>,
    /// Measurement batch encoder
    pub measurement: Arc<dyn MeasurementEncoder>,
}

impl Default for Encoders {
    fn default() -> Self {
        Self {
            envelope: Arc::new(JsonEnvelopeEncoder),
            measurement: Arc::new(CborMeasurementEncoder),
        }
    }
}

/// Replier writing to the relay session
#[derive(Clone)]
pub struct Reporter {
    session: SessionHandle,
    encoders: Encoders,
    connectivity: Arc<dyn Connectivity>,
    sensor: Arc<dyn Sensor>,
}

impl Reporter {
    /// Create a reporter on top of a session handle
    pub fn new(
        session: SessionHandle,
        encoders: Encoders,
        connectivity: Arc<dyn Connectivity>,
        sensor: Arc<dyn Sensor>,
    ) -> Self {
        Self {
            session,
            encoders,
            connectivity,
            sensor,
        }
    }

    /// Encode a batch of measurements and send it with the compact tag
    pub async fn send_measurements(&self, measurements: &[Measurement]) {
        match self.encoders.measurement.encode(measurements).await {
            Ok(body) => self.deliver(OutboundMessage::compact(body)),
            Err(e) => error!("Failed to encode {} measurement(s): {}", measurements.len(), e),
        }
    }

    fn deliver(&self, message: OutboundMessage) {
        debug!("Sending {} message ({} bytes)", message.tag(), message.body().len());
        if let Err(e) = self.session.send(message) {
            warn!("Dropping outbound message: {}", e);
        }
    }
}

#[async_trait]
impl Replier for Reporter {
    async fn reply(&self, message: &str, encoding: ReplyEncoding) {
        match encoding {
            ReplyEncoding::Clear => self.deliver(OutboundMessage::raw(message)),
            ReplyEncoding::Generic => {
                let envelope = StatusEnvelope::from_message(
                    message,
                    self.connectivity.state(),
                    self.sensor.state(),
                );
                match self.encoders.envelope.encode(&envelope).await {
                    Ok(body) => self.deliver(OutboundMessage::structured(body)),
                    Err(e) => error!("Failed to encode status envelope for {:?}: {}", message, e),
                }
            }
        }
    }
}
