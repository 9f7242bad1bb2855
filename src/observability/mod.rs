//! Observability for the telemetry bridge
//!
//! Structured logging, process-wide metrics and the optional health/state
//! HTTP server.

pub mod health;
pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use health::HealthServer;
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{message_span, session_span};
