//! Transport layer for the telemetry bridge
//!
//! The supervisor drives broker sessions through two traits so the lifecycle
//! logic can be exercised without a network:
//!
//! - [`Connector`] produces a fresh [`Session`] per connection attempt.
//! - [`Session`] subscribes once, then yields inbound messages in the order
//!   the broker delivered them until it fails or is closed.
//!
//! Keepalive is the session's responsibility: a session whose broker stops
//! answering liveness probes must fail `next_message` with
//! [`TransportError::Timeout`].

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;

pub mod mqtt;

/// A message received on the telemetry subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

impl InboundMessage {
    pub fn new<T: Into<String>, P: Into<Bytes>>(topic: T, payload: P) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }
}

/// One live broker session
#[async_trait]
pub trait Session: Send {
    /// Subscribe to the telemetry topic and wait for the broker's acknowledgment
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Wait for the next inbound message
    async fn next_message(&mut self) -> Result<InboundMessage, TransportError>;

    /// Close the session. Best effort, must not block indefinitely.
    async fn close(&mut self);
}

/// Factory for broker sessions
#[async_trait]
pub trait Connector: Send {
    type Session: Session;

    /// Establish a new session using a fresh client identity
    async fn connect(&mut self, client_id: &str) -> Result<Self::Session, TransportError>;
}

/// Type alias for the MQTT connector used in production
pub type MqttTransport = mqtt::MqttConnector;
