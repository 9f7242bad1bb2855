//! Configuration system for the telemetry bridge
//!
//! Configuration is read from TOML. Every field has a default, so an empty
//! file (or no file at all) yields a bridge pointed at the public test
//! broker. Field names accept both the snake_case form and the camelCase
//! names used by earlier clients (`brokerUrl`, `keepAliveSec`, ...).

use crate::error::{ConfigError, ConfigurationError};
use crate::protocol::validate_topic_filter;
use crate::transport::mqtt::BrokerAddress;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BROKER_URL: &str = "tcp://test.mosquitto.org:1883";
pub const DEFAULT_TOPIC: &str = "virtusense/unique_id_123/alert_output";
pub const DEFAULT_CLIENT_ID_PREFIX: &str = "tbridge";

/// Largest keepalive an MQTT 3.1.1 CONNECT packet can carry
pub const MAX_KEEP_ALIVE_SECS: u64 = u16::MAX as u64;

/// Main bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub backoff: BackoffSection,
    /// Health/state HTTP server; disabled when absent
    #[serde(default)]
    pub health: Option<HealthSection>,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// `scheme://host:port`, scheme one of tcp, mqtt, ssl, mqtts
    #[serde(default = "default_broker_url", alias = "brokerUrl")]
    pub broker_url: String,
    /// Telemetry topic filter, wildcards allowed
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_connect_timeout", alias = "connectTimeoutSec")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keep_alive", alias = "keepAliveSec")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_true", alias = "cleanSession")]
    pub clean_session: bool,
    #[serde(default = "default_client_id_prefix", alias = "clientIdPrefix")]
    pub client_id_prefix: String,
    /// Environment variable containing username
    #[serde(default)]
    pub username_env: Option<String>,
    /// Environment variable containing password
    #[serde(default)]
    pub password_env: Option<String>,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            topic: default_topic(),
            connect_timeout_secs: default_connect_timeout(),
            keep_alive_secs: default_keep_alive(),
            clean_session: true,
            client_id_prefix: default_client_id_prefix(),
            username_env: None,
            password_env: None,
        }
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffSection {
    #[serde(default = "default_backoff_base", alias = "backoffBaseMs")]
    pub base_ms: u64,
    #[serde(default = "default_backoff_max", alias = "backoffMaxMs")]
    pub max_ms: u64,
    /// Add random jitter to each delay
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            base_ms: default_backoff_base(),
            max_ms: default_backoff_max(),
            jitter: true,
        }
    }
}

/// Health/state HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    #[serde(default = "default_health_port")]
    pub port: u16,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            port: default_health_port(),
        }
    }
}

fn default_broker_url() -> String {
    DEFAULT_BROKER_URL.to_string()
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_client_id_prefix() -> String {
    DEFAULT_CLIENT_ID_PREFIX.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_keep_alive() -> u64 {
    20
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_backoff_max() -> u64 {
    30_000
}

fn default_health_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything the supervisor would otherwise fail on at runtime
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.broker_address()?;
        validate_topic_filter(&self.broker.topic)?;

        if self.broker.connect_timeout_secs == 0 {
            return Err(ConfigurationError::invalid_setting(
                "connect_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.broker.keep_alive_secs == 0 || self.broker.keep_alive_secs > MAX_KEEP_ALIVE_SECS {
            return Err(ConfigurationError::invalid_setting(
                "keep_alive_secs",
                format!("must be between 1 and {MAX_KEEP_ALIVE_SECS}"),
            ));
        }
        if self.backoff.base_ms == 0 {
            return Err(ConfigurationError::invalid_setting(
                "base_ms",
                "must be greater than zero",
            ));
        }
        if self.backoff.max_ms < self.backoff.base_ms {
            return Err(ConfigurationError::invalid_setting(
                "max_ms",
                format!(
                    "must be at least base_ms ({} < {})",
                    self.backoff.max_ms, self.backoff.base_ms
                ),
            ));
        }
        Ok(())
    }

    pub fn broker_address(&self) -> Result<BrokerAddress, ConfigurationError> {
        BrokerAddress::parse(&self.broker.broker_url)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.broker.connect_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.broker.keep_alive_secs)
    }
}
