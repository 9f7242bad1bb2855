//! Error taxonomy for the telemetry bridge
//!
//! Three classes of failure exist and each has a fixed recovery policy:
//!
//! - [`DecodeError`](crate::protocol::DecodeError) - recovered locally, the
//!   pipeline moves on to the next message.
//! - [`TransportError`] - recovered by the supervisor through reconnect and
//!   backoff; never terminates the worker.
//! - [`ConfigurationError`] - fatal, reported once, the supervisor loop never
//!   starts.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Maximum length of any error text forwarded to the event sink
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Transient broker/network failures. Every variant is retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// DNS, TCP, TLS or protocol level failure while establishing a session
    #[error("Connection failed: {0}")]
    ConnectFailed(String),
    /// Broker refused credentials or the telemetry subscription
    #[error("Broker rejected authorization: {0}")]
    AuthRejected(String),
    /// Connect/subscribe handshake or keepalive exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),
    /// Established session ended without a local request
    #[error("Connection closed unexpectedly: {0}")]
    UnexpectedClose(String),
}

impl TransportError {
    /// Short machine-friendly name used in metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::ConnectFailed(_) => "connect_failed",
            TransportError::AuthRejected(_) => "auth_rejected",
            TransportError::Timeout(_) => "timeout",
            TransportError::UnexpectedClose(_) => "unexpected_close",
        }
    }

    pub fn connect_failed<S: Into<String>>(reason: S) -> Self {
        Self::ConnectFailed(sanitize_error_message(&reason.into()))
    }

    pub fn auth_rejected<S: Into<String>>(reason: S) -> Self {
        Self::AuthRejected(sanitize_error_message(&reason.into()))
    }

    pub fn timeout<S: Into<String>>(reason: S) -> Self {
        Self::Timeout(sanitize_error_message(&reason.into()))
    }

    pub fn unexpected_close<S: Into<String>>(reason: S) -> Self {
        Self::UnexpectedClose(sanitize_error_message(&reason.into()))
    }
}

/// Invalid configuration. Fatal: reported once and never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid broker address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("Invalid telemetry topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },
    #[error("Invalid setting {setting}: {reason}")]
    InvalidSetting {
        setting: &'static str,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn invalid_address<A: Into<String>, R: Into<String>>(address: A, reason: R) -> Self {
        Self::InvalidAddress {
            address: sanitize_error_message(&address.into()),
            reason: reason.into(),
        }
    }

    pub fn invalid_topic<T: Into<String>, R: Into<String>>(topic: T, reason: R) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_setting<R: Into<String>>(setting: &'static str, reason: R) -> Self {
        Self::InvalidSetting {
            setting,
            reason: reason.into(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigurationError),
}

/// Top level error for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

static SECRET_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(password|passwd|token|key|secret)[=:]\s*\S+").ok());

static URL_CREDENTIALS_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)([a-z][a-z0-9+.-]*://)[^/@\s:]+(:[^/@\s]*)?@").ok());

/// Redact secrets and truncate text that will leave the process through the sink
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    if let Some(re) = SECRET_PATTERN.as_ref() {
        sanitized = re.replace_all(&sanitized, "${1}=***").to_string();
    }

    // user:pass@host inside broker URLs
    if let Some(re) = URL_CREDENTIALS_PATTERN.as_ref() {
        sanitized = re.replace_all(&sanitized, "${1}***@").to_string();
    }

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}
