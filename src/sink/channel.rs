//! Channel-backed sink
//!
//! Hands every callback to an unbounded tokio channel so the supervisor never
//! waits on the consumer. The presentation layer drains the receiver on its
//! own context.

use super::{EventSink, LogLine};
use crate::alert::DisplayState;
use crate::supervisor::ConnectionState;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

/// Everything a sink can be told, as a value
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    DisplayState(DisplayState),
    Log(LogLine),
    ConnectionState(ConnectionState),
    Backoff { attempt: u32, delay: Duration },
}

pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SinkEvent) {
        if self.tx.send(event).is_err() {
            trace!("Sink receiver dropped, discarding event");
        }
    }
}

impl EventSink for ChannelSink {
    fn on_display_state(&self, state: DisplayState) {
        self.forward(SinkEvent::DisplayState(state));
    }

    fn on_log(&self, entry: LogLine) {
        self.forward(SinkEvent::Log(entry));
    }

    fn on_connection_state(&self, state: ConnectionState) {
        self.forward(SinkEvent::ConnectionState(state));
    }

    fn on_backoff(&self, attempt: u32, delay: Duration) {
        self.forward(SinkEvent::Backoff { attempt, delay });
    }
}
