//! Event sink boundary
//!
//! The supervisor pushes every display state, audit log line and connection
//! state change through an [`EventSink`]. Implementations must return quickly
//! and tolerate being called from the supervisor's worker while other threads
//! read whatever state they keep; marshaling onto a rendering context is the
//! implementation's job.

pub mod channel;
pub mod snapshot;
pub mod tracing_sink;

use crate::alert::DisplayState;
use crate::supervisor::ConnectionState;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use channel::{ChannelSink, SinkEvent};
pub use snapshot::{SinkSnapshot, SnapshotSink};
pub use tracing_sink::TracingSink;

/// Outward interface consumed by the presentation layer
pub trait EventSink: Send + Sync {
    /// A new display state replaced the previous one
    fn on_display_state(&self, state: DisplayState);

    /// An audit log line
    fn on_log(&self, entry: LogLine);

    /// The broker session changed state
    fn on_connection_state(&self, state: ConnectionState);

    /// A reconnect attempt was scheduled after `delay`
    fn on_backoff(&self, _attempt: u32, _delay: Duration) {}
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn on_display_state(&self, state: DisplayState) {
        (**self).on_display_state(state)
    }

    fn on_log(&self, entry: LogLine) {
        (**self).on_log(entry)
    }

    fn on_connection_state(&self, state: ConnectionState) {
        (**self).on_connection_state(state)
    }

    fn on_backoff(&self, attempt: u32, delay: Duration) {
        (**self).on_backoff(attempt, delay)
    }
}

/// Audit log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// What part of the bridge produced a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Connection,
    Message,
    Decode,
    Alert,
    Config,
}

/// One audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
}

impl LogLine {
    pub fn new<S: Into<String>>(level: LogLevel, category: LogCategory, message: S) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            category,
            message: message.into(),
        }
    }

    pub fn info<S: Into<String>>(category: LogCategory, message: S) -> Self {
        Self::new(LogLevel::Info, category, message)
    }

    pub fn warn<S: Into<String>>(category: LogCategory, message: S) -> Self {
        Self::new(LogLevel::Warn, category, message)
    }

    pub fn error<S: Into<String>>(category: LogCategory, message: S) -> Self {
        Self::new(LogLevel::Error, category, message)
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.timestamp.with_timezone(&Local);
        write!(f, "{} > {}", local.format("%H:%M:%S"), self.message)
    }
}

/// Forwards every callback to several sinks in registration order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn on_display_state(&self, state: DisplayState) {
        for sink in &self.sinks {
            sink.on_display_state(state.clone());
        }
    }

    fn on_log(&self, entry: LogLine) {
        for sink in &self.sinks {
            sink.on_log(entry.clone());
        }
    }

    fn on_connection_state(&self, state: ConnectionState) {
        for sink in &self.sinks {
            sink.on_connection_state(state);
        }
    }

    fn on_backoff(&self, attempt: u32, delay: Duration) {
        for sink in &self.sinks {
            sink.on_backoff(attempt, delay);
        }
    }
}
