//! Sink that mirrors bridge events into `tracing`
//!
//! Used by the headless daemon, where the "presentation layer" is the
//! structured log stream.

use super::{EventSink, LogLevel, LogLine};
use crate::alert::DisplayState;
use crate::supervisor::ConnectionState;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingSink {
    fn on_display_state(&self, state: DisplayState) {
        if state.alert_triggered() {
            warn!(
                label = %state.label(),
                subtext = %state.subtext(),
                severity = %state.severity(),
                color = state.severity().color_hex(),
                alert = true,
                "ALERT: {}",
                state.label()
            );
        } else {
            info!(
                label = %state.label(),
                subtext = %state.subtext(),
                severity = %state.severity(),
                color = state.severity().color_hex(),
                "Display state: {}",
                state.label()
            );
        }
    }

    fn on_log(&self, entry: LogLine) {
        let category = format!("{:?}", entry.category).to_lowercase();
        match entry.level {
            LogLevel::Info => info!(category = %category, "{}", entry.message),
            LogLevel::Warn => warn!(category = %category, "{}", entry.message),
            LogLevel::Error => error!(category = %category, "{}", entry.message),
        }
    }

    fn on_connection_state(&self, state: ConnectionState) {
        info!(connection_state = %state, "Connection state changed");
    }

    fn on_backoff(&self, attempt: u32, delay: Duration) {
        info!(
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
    }
}
