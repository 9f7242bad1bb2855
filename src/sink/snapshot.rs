//! Last-known-state sink
//!
//! Keeps the latest display and connection state plus a short tail of log
//! lines so readers on other threads (the HTTP state endpoint, a UI poll
//! loop) always have something to render, including during outages.

use super::{EventSink, LogLine};
use crate::alert::{AlertStateMachine, DisplayState};
use crate::supervisor::ConnectionState;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::RwLock;

/// Log lines kept for the state endpoint
pub const RECENT_LOG_LIMIT: usize = 100;

/// Point-in-time copy of everything the sink has seen
#[derive(Debug, Clone, Serialize)]
pub struct SinkSnapshot {
    pub display: DisplayState,
    pub connection: ConnectionState,
    pub recent_logs: VecDeque<LogLine>,
    pub alerts_triggered: u64,
}

pub struct SnapshotSink {
    inner: RwLock<SinkSnapshot>,
}

impl SnapshotSink {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SinkSnapshot {
                display: AlertStateMachine::new().current().clone(),
                connection: ConnectionState::Disconnected,
                recent_logs: VecDeque::with_capacity(RECENT_LOG_LIMIT),
                alerts_triggered: 0,
            }),
        }
    }

    pub fn snapshot(&self) -> SinkSnapshot {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .connection
    }

    fn update<F: FnOnce(&mut SinkSnapshot)>(&self, f: F) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }
}

impl Default for SnapshotSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for SnapshotSink {
    fn on_display_state(&self, state: DisplayState) {
        self.update(|snapshot| {
            if state.alert_triggered() {
                snapshot.alerts_triggered += 1;
            }
            snapshot.display = state;
        });
    }

    fn on_log(&self, entry: LogLine) {
        self.update(|snapshot| {
            if snapshot.recent_logs.len() == RECENT_LOG_LIMIT {
                snapshot.recent_logs.pop_front();
            }
            snapshot.recent_logs.push_back(entry);
        });
    }

    fn on_connection_state(&self, state: ConnectionState) {
        self.update(|snapshot| snapshot.connection = state);
    }
}
