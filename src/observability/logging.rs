//! Operator-facing diagnostics via `tracing`
//!
//! Diagnostic output for operators. The audit trail that reaches the
//! presentation layer goes through the [`EventSink`](crate::sink::EventSink)
//! instead; [`TracingSink`](crate::sink::TracingSink) bridges the two.
//!
//! Configured from the environment:
//!
//! | Variable     | Values                              | Default |
//! |--------------|-------------------------------------|---------|
//! | `LOG_LEVEL`  | ERROR, WARN, INFO, DEBUG, TRACE     | INFO    |
//! | `LOG_FORMAT` | `json`, `pretty`, `compact`         | json    |
//! | `LOG_SPANS`  | `true` to log span open/close       | false   |
//! | `RUST_LOG`   | full `EnvFilter` directives         | unset   |
//!
//! `RUST_LOG` wins over `LOG_LEVEL` when both are set. Broker client and
//! HTTP stack chatter is held at WARN unless `RUST_LOG` says otherwise.
//!
//! ```bash
//! LOG_FORMAT=pretty LOG_LEVEL=DEBUG ./telemetry-bridge run
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependencies whose INFO output is noise for the bridge
const NOISY_DEPENDENCIES: &[&str] = &["rumqttc=warn", "hyper=warn", "warp=warn", "tokio=warn"];

/// Subscriber output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers
    Json,
    /// Multi-line, coloured
    Pretty,
    /// One coloured line per event
    Compact,
}

impl LogFormat {
    /// Case-insensitive; anything unrecognised selects JSON
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Parse a `LOG_LEVEL` value, falling back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Build the filter used when `RUST_LOG` is not set
pub fn build_filter(level: Level) -> EnvFilter {
    NOISY_DEPENDENCIES
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(EnvFilter::new(level.to_string()), |filter, directive| {
            filter.add_directive(directive)
        })
}

/// Initialize logging with manual configuration
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool) {
    // Allow RUST_LOG to override
    let filter = match env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => build_filter(level),
    };

    let span_events = if include_spans {
        fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE
    } else {
        fmt::format::FmtSpan::NONE
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    // try_init so a second call (tests, embedding) is harmless
    let _ = match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_span_events(span_events))
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_span_events(span_events),
            )
            .try_init(),
        LogFormat::Compact => subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(false)
                    .with_span_events(span_events),
            )
            .try_init(),
    };
}

/// Initialize logging from environment variables
pub fn init_default_logging() {
    let level = parse_level(&env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()));

    let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let log_format = LogFormat::parse(&format);

    let include_spans = env::var("LOG_SPANS")
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true";

    init_logging(level, log_format, include_spans);
}

/// Create a span covering one broker session
#[macro_export]
macro_rules! session_span {
    ($($field:tt)*) => {
        tracing::info_span!("broker_session", $($field)*)
    };
}

/// Create a span covering one inbound message
#[macro_export]
macro_rules! message_span {
    ($($field:tt)*) => {
        tracing::debug_span!("inbound_message", $($field)*)
    };
}

// Re-export macros for convenience
pub use {message_span, session_span};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("Compact"), LogFormat::Compact);
    }

    #[test]
    fn test_log_format_parse_invalid_defaults_to_json() {
        assert_eq!(LogFormat::parse("invalid"), LogFormat::Json);
        assert_eq!(LogFormat::parse(""), LogFormat::Json);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Json);
    }

    #[test]
    fn test_parse_level() {
        let test_cases = vec![
            ("ERROR", Level::ERROR),
            ("warn", Level::WARN),
            ("Info", Level::INFO),
            ("DEBUG", Level::DEBUG),
            ("trace", Level::TRACE),
            ("invalid", Level::INFO),
        ];

        for (input, expected) in test_cases {
            assert_eq!(parse_level(input), expected, "Failed for input: {input}");
        }
    }

    #[test]
    fn test_build_filter_quiets_dependencies() {
        let rendered = build_filter(Level::DEBUG).to_string();
        assert!(rendered.contains("rumqttc=warn"));
    }

    #[test]
    fn test_span_macros_expand() {
        let session = session_span!(client_id = "tbridge-1");
        let _entered = session.enter();
        let message = message_span!(topic = "sensors/a");
        let _message_entered = message.enter();
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(Level::INFO, LogFormat::Compact, false);
        init_logging(Level::DEBUG, LogFormat::Json, true);
    }
}
