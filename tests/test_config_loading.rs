//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.

use std::io::Write;
use std::time::Duration;
use telemetry_bridge::config::{BridgeConfig, DEFAULT_BROKER_URL, DEFAULT_TOPIC};
use telemetry_bridge::error::{ConfigError, ConfigurationError};
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[broker]
broker_url = "mqtt://broker.local:1884"
topic = "plant/+/alert_output"
connect_timeout_secs = 5
keep_alive_secs = 30
client_id_prefix = "line3"

[backoff]
base_ms = 250
max_ms = 8000
jitter = false

[health]
port = 9090
"#,
    );

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.broker_url, "mqtt://broker.local:1884");
    assert_eq!(config.broker.topic, "plant/+/alert_output");
    assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.keep_alive(), Duration::from_secs(30));
    assert_eq!(config.broker.client_id_prefix, "line3");
    assert_eq!(config.backoff.base_ms, 250);
    assert_eq!(config.backoff.max_ms, 8000);
    assert!(!config.backoff.jitter);
    assert_eq!(config.health.map(|h| h.port), Some(9090));

    let address = BridgeConfig::default().broker_address().unwrap();
    assert_eq!(address.port, 1883);
}

#[test]
fn test_empty_file_yields_defaults() {
    let temp_file = write_config("");

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config, BridgeConfig::default());
    assert_eq!(config.broker.broker_url, DEFAULT_BROKER_URL);
    assert_eq!(config.broker.topic, DEFAULT_TOPIC);
    assert!(config.broker.clean_session);
    assert!(config.health.is_none());
}

#[test]
fn test_camel_case_names_are_accepted() {
    let temp_file = write_config(
        r#"
[broker]
brokerUrl = "tcp://10.0.0.5:1883"
connectTimeoutSec = 3
keepAliveSec = 15

[backoff]
backoffBaseMs = 100
backoffMaxMs = 1000
"#,
    );

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.broker_url, "tcp://10.0.0.5:1883");
    assert_eq!(config.broker.connect_timeout_secs, 3);
    assert_eq!(config.broker.keep_alive_secs, 15);
    assert_eq!(config.backoff.base_ms, 100);
    assert_eq!(config.backoff.max_ms, 1000);
}

#[test]
fn test_missing_file_is_a_read_error() {
    let result = BridgeConfig::load_from_file(std::path::Path::new("/nonexistent/bridge.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let temp_file = write_config("[broker\nbroker_url = ");
    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_invalid_broker_url_rejected_on_load() {
    let temp_file = write_config(
        r#"
[broker]
broker_url = "http://broker.local:1883"
"#,
    );

    let result = BridgeConfig::load_from_file(temp_file.path());

    assert!(matches!(
        result,
        Err(ConfigError::Invalid(ConfigurationError::InvalidAddress { .. }))
    ));
}

#[test]
fn test_invalid_topic_rejected_on_load() {
    let temp_file = write_config(
        r#"
[broker]
topic = "sensors/#/alert"
"#,
    );

    let result = BridgeConfig::load_from_file(temp_file.path());

    assert!(matches!(
        result,
        Err(ConfigError::Invalid(ConfigurationError::InvalidTopic { .. }))
    ));
}

#[test]
fn test_backoff_ceiling_below_base_rejected() {
    let temp_file = write_config(
        r#"
[backoff]
base_ms = 5000
max_ms = 1000
"#,
    );

    let err = BridgeConfig::load_from_file(temp_file.path()).unwrap_err();

    match err {
        ConfigError::Invalid(ConfigurationError::InvalidSetting { setting, .. }) => {
            assert_eq!(setting, "max_ms")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_keep_alive_out_of_range_rejected() {
    for value in ["0", "70000"] {
        let temp_file = write_config(&format!("[broker]\nkeep_alive_secs = {value}\n"));
        let err = BridgeConfig::load_from_file(temp_file.path()).unwrap_err();
        assert!(
            err.to_string().contains("keep_alive_secs"),
            "keep_alive_secs = {value}: {err}"
        );
    }
}

#[test]
fn test_effective_config_round_trips_through_toml() {
    let mut config = BridgeConfig::default();
    config.broker.topic = "a/b".to_string();
    config.backoff.max_ms = 12_000;

    let rendered = toml::to_string_pretty(&config).unwrap();
    let reloaded = BridgeConfig::from_toml_str(&rendered).unwrap();

    assert_eq!(reloaded, config);
}
