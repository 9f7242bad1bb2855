//! Test helpers and utilities for integration tests

use telemetry_bridge::config::BridgeConfig;
use telemetry_bridge::transport::InboundMessage;

pub const TEST_TOPIC: &str = "sensors/unit-7/alert_output";

/// Configuration with millisecond backoff so reconnect tests finish quickly
#[allow(dead_code)]
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.broker.broker_url = "tcp://localhost:1883".to_string();
    config.broker.topic = TEST_TOPIC.to_string();
    config.broker.connect_timeout_secs = 2;
    config.backoff.base_ms = 5;
    config.backoff.max_ms = 40;
    config
}

/// A message on the test topic
#[allow(dead_code)]
pub fn telemetry(payload: &'static str) -> InboundMessage {
    InboundMessage::new(TEST_TOPIC, payload)
}
