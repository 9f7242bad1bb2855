//! MQTT 3.1.1 transport built on rumqttc
//!
//! Pure functions are kept apart from I/O:
//!
//! - [`connection`] - broker address parsing, client identity, `MqttOptions`
//! - [`message_handler`] - event routing and error classification
//! - [`client`] - the [`Connector`](crate::transport::Connector) and
//!   [`Session`](crate::transport::Session) implementations
//!
//! # Usage
//!
//! ```rust,no_run
//! use telemetry_bridge::config::BridgeConfig;
//! use telemetry_bridge::transport::mqtt::MqttConnector;
//! use telemetry_bridge::transport::{Connector, Session};
//!
//! # tokio_test::block_on(async {
//! let config = BridgeConfig::default();
//! let mut connector = MqttConnector::new(&config)?;
//! let mut session = connector.connect("tbridge-example").await?;
//! session.subscribe(&config.broker.topic).await?;
//! let message = session.next_message().await?;
//! println!("{} bytes on {}", message.payload.len(), message.topic);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{MqttConnector, MqttSession};
pub use connection::{generate_client_id, BrokerAddress, BrokerScheme};
pub use message_handler::{EventRoute, MessageHandler, SessionPhase};
