//! Telemetry Bridge
//!
//! A resilient MQTT client that turns `STATUS:VALUE` sensor payloads into an
//! alert display state for a presentation layer.
//!
//! # Overview
//!
//! - [`protocol`] decodes wire payloads into [`SensorEvent`]s
//! - [`alert`] maps events onto the [`DisplayState`] shown to operators
//! - [`supervisor`] owns the broker session: connect, subscribe, read,
//!   reconnect with backoff, shut down on request
//! - [`sink`] is the outward boundary the presentation layer implements
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telemetry_bridge::config::BridgeConfig;
//! use telemetry_bridge::sink::TracingSink;
//! use telemetry_bridge::supervisor::Supervisor;
//! use telemetry_bridge::transport::mqtt::MqttConnector;
//!
//! # tokio_test::block_on(async {
//! let config = BridgeConfig::default();
//! let connector = MqttConnector::new(&config)?;
//! let handle = Supervisor::new(config, connector, Arc::new(TracingSink::new())).spawn();
//!
//! // ... later
//! handle.shutdown().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod alert;
pub mod config;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod protocol;
pub mod sink;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use alert::{transition, AlertStateMachine, DisplayState, Severity};
pub use config::BridgeConfig;
pub use error::{
    BridgeError, BridgeResult, ConfigError, ConfigurationError, TransportError,
};
pub use pipeline::{MessagePipeline, PipelineOutcome};
pub use protocol::{decode, DecodeError, SensorEvent, SensorStatus};
pub use sink::{EventSink, LogCategory, LogLevel, LogLine};
pub use supervisor::{ConnectionState, Supervisor, SupervisorHandle};
pub use transport::MqttTransport;
