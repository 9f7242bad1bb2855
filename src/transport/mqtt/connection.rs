//! Pure connection configuration for the MQTT transport
//!
//! This module contains pure functions for broker address parsing, client
//! identity generation and `MqttOptions` construction.

use crate::config::BrokerSection;
use crate::error::ConfigurationError;
use rumqttc::{MqttOptions, NetworkOptions, Transport as RumqttcTransport};
use std::fmt;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// MQTT 3.1.1 brokers must accept client identifiers up to this length
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// Longest prefix kept in generated client identifiers
pub const MAX_CLIENT_ID_PREFIX_LEN: usize = 10;

/// Status payloads are tiny; anything larger is rejected by the transport
pub const MAX_INCOMING_PACKET_SIZE: usize = 16 * 1024;
pub const MAX_OUTGOING_PACKET_SIZE: usize = 16 * 1024;

pub const DEFAULT_PLAIN_PORT: u16 = 1883;
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// Wire security of a broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerScheme {
    Tcp,
    Tls,
}

/// Parsed `scheme://host:port` broker address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub scheme: BrokerScheme,
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Parse a broker URL. Accepts `tcp`/`mqtt` and `ssl`/`mqtts` schemes.
    pub fn parse(broker_url: &str) -> Result<Self, ConfigurationError> {
        let url = Url::parse(broker_url)
            .map_err(|e| ConfigurationError::invalid_address(broker_url, e.to_string()))?;

        let scheme = match url.scheme() {
            "tcp" | "mqtt" => BrokerScheme::Tcp,
            "ssl" | "mqtts" => BrokerScheme::Tls,
            other => {
                return Err(ConfigurationError::invalid_address(
                    broker_url,
                    format!("unsupported scheme '{other}' (expected tcp, mqtt, ssl or mqtts)"),
                ))
            }
        };

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ConfigurationError::invalid_address(broker_url, "missing host"))?;

        if !(url.path().is_empty() || url.path() == "/") || url.query().is_some() {
            return Err(ConfigurationError::invalid_address(
                broker_url,
                "broker address must not carry a path or query",
            ));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(ConfigurationError::invalid_address(
                broker_url,
                "credentials belong in username_env/password_env, not the URL",
            ));
        }

        let port = url.port().unwrap_or(match scheme {
            BrokerScheme::Tcp => DEFAULT_PLAIN_PORT,
            BrokerScheme::Tls => DEFAULT_TLS_PORT,
        });
        if port == 0 {
            return Err(ConfigurationError::invalid_address(broker_url, "port 0"));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            BrokerScheme::Tcp => "tcp",
            BrokerScheme::Tls => "ssl",
        };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

/// Generate a unique client identifier for one connection attempt
pub fn generate_client_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let prefix: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(MAX_CLIENT_ID_PREFIX_LEN)
        .collect();

    if prefix.is_empty() {
        return suffix[..MAX_CLIENT_ID_LEN].to_string();
    }

    let room = MAX_CLIENT_ID_LEN - prefix.len() - 1;
    format!("{prefix}-{}", &suffix[..room])
}

/// Read broker credentials from the configured environment variables
pub fn resolve_credentials(config: &BrokerSection) -> Option<(String, String)> {
    let username_env = config.username_env.as_ref()?;
    let username = std::env::var(username_env).ok()?;
    let password = config
        .password_env
        .as_ref()
        .and_then(|env_name| std::env::var(env_name).ok())
        .unwrap_or_default();
    Some((username, password))
}

/// Build `MqttOptions` for one session
pub fn configure_mqtt_options(
    client_id: &str,
    address: &BrokerAddress,
    config: &BrokerSection,
) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(client_id, address.host.clone(), address.port);

    if address.scheme == BrokerScheme::Tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some((username, password)) = resolve_credentials(config) {
        mqtt_options.set_credentials(username, password);
    }

    // Every reconnect starts from a clean session; nothing is replayed
    mqtt_options.set_clean_session(config.clean_session);
    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_max_packet_size(MAX_INCOMING_PACKET_SIZE, MAX_OUTGOING_PACKET_SIZE);

    mqtt_options
}

/// Build `NetworkOptions` for one session.
///
/// rumqttc applies its own deadline (5s unless set here) to the TCP connect,
/// TLS handshake and CONNACK wait, so it must follow `connect_timeout_secs`.
pub fn configure_network_options(config: &BrokerSection) -> NetworkOptions {
    let mut network_options = NetworkOptions::new();
    network_options.set_connection_timeout(config.connect_timeout_secs);
    network_options
}
