//! Sensor status wire format decoder
//!
//! Payloads are UTF-8 text of the form `<STATUS>:<VALUE>`. Decoding is
//! total: every input produces either a [`SensorEvent`] or a [`DecodeError`].
//! Unrecognized status tokens decode to [`SensorStatus::Unknown`] instead of
//! failing so they still reach the event sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Separator between the status token and the value token
pub const STATUS_DELIMITER: char = ':';

/// Longest payload excerpt included in audit log lines
pub const PREVIEW_MAX_CHARS: usize = 64;

/// Status vocabulary carried by the sensor protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensorStatus {
    Fault,
    Idle,
    Normal,
    /// Any token outside the known vocabulary
    Unknown,
}

impl SensorStatus {
    /// Case-sensitive match against the known vocabulary
    pub fn from_token(token: &str) -> Self {
        match token {
            "FAULT" => SensorStatus::Fault,
            "IDLE" => SensorStatus::Idle,
            "NORMAL" => SensorStatus::Normal,
            _ => SensorStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Fault => "FAULT",
            SensorStatus::Idle => "IDLE",
            SensorStatus::Normal => "NORMAL",
            SensorStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded unit of telemetry.
///
/// Fields are private: the only way to obtain a `SensorEvent` is through
/// [`decode`] or [`decode_at`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorEvent {
    status: SensorStatus,
    status_token: String,
    raw_value: String,
    numeric_value: Option<f64>,
    received_at: DateTime<Utc>,
}

impl SensorEvent {
    pub fn status(&self) -> SensorStatus {
        self.status
    }

    /// Status token exactly as it appeared on the wire
    pub fn status_token(&self) -> &str {
        &self.status_token
    }

    /// Value token exactly as it appeared on the wire
    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }

    /// Parsed reading when the value token is a finite number
    pub fn numeric_value(&self) -> Option<f64> {
        self.numeric_value
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_value.is_some()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// Reasons a payload cannot be decoded
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed payload: {reason}")]
    Malformed { reason: &'static str },
    #[error("Empty payload")]
    EmptyPayload,
    #[error("Payload is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidEncoding { valid_up_to: usize },
}

impl DecodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Malformed { .. } => "malformed",
            DecodeError::EmptyPayload => "empty_payload",
            DecodeError::InvalidEncoding { .. } => "invalid_encoding",
        }
    }
}

/// Decode a payload, stamping it with the current time
pub fn decode(payload: &[u8]) -> Result<SensorEvent, DecodeError> {
    decode_at(payload, Utc::now())
}

/// Decode a payload with an explicit receive timestamp
pub fn decode_at(payload: &[u8], received_at: DateTime<Utc>) -> Result<SensorEvent, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }

    let text = std::str::from_utf8(payload).map_err(|e| DecodeError::InvalidEncoding {
        valid_up_to: e.valid_up_to(),
    })?;

    let mut parts = text.split(STATUS_DELIMITER);
    let (Some(status_token), Some(raw_value), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(DecodeError::Malformed {
            reason: "expected exactly one ':' delimiter",
        });
    };

    if status_token.is_empty() {
        return Err(DecodeError::Malformed {
            reason: "status token is empty",
        });
    }
    if raw_value.is_empty() {
        return Err(DecodeError::Malformed {
            reason: "value token is empty",
        });
    }

    let numeric_value = raw_value.parse::<f64>().ok().filter(|v| v.is_finite());

    Ok(SensorEvent {
        status: SensorStatus::from_token(status_token),
        status_token: status_token.to_string(),
        raw_value: raw_value.to_string(),
        numeric_value,
        received_at,
    })
}

/// Printable, bounded excerpt of an untrusted payload for log lines
pub fn payload_preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let mut preview: String = text
        .chars()
        .take(PREVIEW_MAX_CHARS)
        .flat_map(char::escape_default)
        .collect();
    if text.chars().count() > PREVIEW_MAX_CHARS {
        preview.push_str("...");
    }
    preview
}
