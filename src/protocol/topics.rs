//! Topic filter validation and matching
//!
//! The bridge subscribes to exactly one telemetry topic filter. Filters follow
//! MQTT rules: `+` matches one level, `#` matches the remaining levels and must
//! be the last level.

use crate::error::ConfigurationError;

/// Longest topic the MQTT wire format can carry
pub const MAX_TOPIC_LEN: usize = 65_535;

/// Validate a subscription topic filter
pub fn validate_topic_filter(filter: &str) -> Result<(), ConfigurationError> {
    if filter.is_empty() {
        return Err(ConfigurationError::invalid_topic(filter, "topic is empty"));
    }
    if filter.len() > MAX_TOPIC_LEN {
        return Err(ConfigurationError::invalid_topic(
            filter,
            format!("topic exceeds {MAX_TOPIC_LEN} bytes"),
        ));
    }
    if filter.contains('\0') {
        return Err(ConfigurationError::invalid_topic(
            filter,
            "topic contains a NUL character",
        ));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || index != last) {
            return Err(ConfigurationError::invalid_topic(
                filter,
                "'#' must occupy the entire last level",
            ));
        }
        if level.contains('+') && *level != "+" {
            return Err(ConfigurationError::invalid_topic(
                filter,
                "'+' must occupy an entire level",
            ));
        }
    }

    Ok(())
}

/// Check whether a concrete topic name matches a subscription filter
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    // Wildcards never match system topics
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
