//! Thread-safe metrics collection system
//!
//! Atomic counters for broker sessions and the message pipeline, plus a
//! bounded window of reconnect delays.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Reconnect delays kept for the snapshot
const BACKOFF_WINDOW: usize = 100;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // Connection metrics
    connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    auth_rejections: AtomicU64,
    sessions_lost: AtomicU64,
    connection_start_time: AtomicU64,
    backoff_delays: Mutex<Vec<u64>>, // in milliseconds

    // Pipeline metrics
    messages_received: AtomicU64,
    messages_ignored: AtomicU64,
    decode_failures: AtomicU64,
    unknown_statuses: AtomicU64,
    non_numeric_values: AtomicU64,
    alerts_triggered: AtomicU64,
    severity_transitions: AtomicU64,

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            auth_rejections: AtomicU64::new(0),
            sessions_lost: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            backoff_delays: Mutex::new(Vec::new()),
            messages_received: AtomicU64::new(0),
            messages_ignored: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            unknown_statuses: AtomicU64::new(0),
            non_numeric_values: AtomicU64::new(0),
            alerts_triggered: AtomicU64::new(0),
            severity_transitions: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Connection metrics
    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn connection_failed(&self, auth_rejected: bool) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        if auth_rejected {
            self.auth_rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn session_lost(&self) {
        self.sessions_lost.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn backoff_scheduled(&self, delay: Duration) {
        if let Ok(mut delays) = self.backoff_delays.lock() {
            delays.push(delay.as_millis() as u64);
            if delays.len() > BACKOFF_WINDOW {
                delays.remove(0);
            }
        }
    }

    // Pipeline metrics
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_ignored(&self) {
        self.messages_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_status(&self) {
        self.unknown_statuses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn non_numeric_value(&self) {
        self.non_numeric_values.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_triggered(&self) {
        self.alerts_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn severity_changed(&self) {
        self.severity_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let start = self.connection_start_time.load(Ordering::Relaxed);
        let connection_duration_seconds = if start > 0 {
            now.saturating_sub(start)
        } else {
            0
        };

        let (last_backoff_ms, max_backoff_ms) = self
            .backoff_delays
            .lock()
            .map(|delays| {
                (
                    delays.last().copied().unwrap_or(0),
                    delays.iter().copied().max().unwrap_or(0),
                )
            })
            .unwrap_or((0, 0));

        MetricsSnapshot {
            connection: ConnectionMetrics {
                connected: self.is_connected(),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                auth_rejections: self.auth_rejections.load(Ordering::Relaxed),
                sessions_lost: self.sessions_lost.load(Ordering::Relaxed),
                connection_duration_seconds,
                last_backoff_ms,
                max_backoff_ms,
            },
            pipeline: PipelineMetrics {
                messages_received: self.messages_received.load(Ordering::Relaxed),
                messages_ignored: self.messages_ignored.load(Ordering::Relaxed),
                decode_failures: self.decode_failures.load(Ordering::Relaxed),
                unknown_statuses: self.unknown_statuses.load(Ordering::Relaxed),
                non_numeric_values: self.non_numeric_values.load(Ordering::Relaxed),
                alerts_triggered: self.alerts_triggered.load(Ordering::Relaxed),
                severity_transitions: self.severity_transitions.load(Ordering::Relaxed),
            },
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.connection_attempts,
            &self.connections_established,
            &self.connection_failures,
            &self.auth_rejections,
            &self.sessions_lost,
            &self.connection_start_time,
            &self.messages_received,
            &self.messages_ignored,
            &self.decode_failures,
            &self.unknown_statuses,
            &self.non_numeric_values,
            &self.alerts_triggered,
            &self.severity_transitions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.connected.store(false, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut delays) = self.backoff_delays.lock() {
            delays.clear();
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Public metrics structures
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connection: ConnectionMetrics,
    pub pipeline: PipelineMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub auth_rejections: u64,
    pub sessions_lost: u64,
    pub connection_duration_seconds: u64,
    pub last_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetrics {
    pub messages_received: u64,
    pub messages_ignored: u64,
    pub decode_failures: u64,
    pub unknown_statuses: u64,
    pub non_numeric_values: u64,
    pub alerts_triggered: u64,
    pub severity_transitions: u64,
}

// Helper functions
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
