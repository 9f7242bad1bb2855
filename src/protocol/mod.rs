//! Sensor status protocol
//!
//! Wire payload decoding and telemetry topic handling.

pub mod decoder;
pub mod topics;

pub use decoder::{
    decode, decode_at, payload_preview, DecodeError, SensorEvent, SensorStatus, STATUS_DELIMITER,
};
pub use topics::{topic_matches, validate_topic_filter};
