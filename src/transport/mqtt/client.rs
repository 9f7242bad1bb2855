//! Impure I/O operations for the MQTT transport
//!
//! Each connection attempt builds a fresh rumqttc client and event loop.
//! Nothing is carried over between sessions: with a clean session the broker
//! forgets the subscription, so the supervisor subscribes again every time.

use super::connection::{configure_mqtt_options, configure_network_options, BrokerAddress};
use super::message_handler::{EventRoute, MessageHandler, SessionPhase};
use crate::config::{BridgeConfig, BrokerSection};
use crate::error::{ConfigurationError, TransportError};
use crate::transport::{Connector, InboundMessage, Session};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, QoS};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Requests buffered between the client handle and its event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Upper bound on flushing DISCONNECT during close
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens MQTT 3.1.1 sessions against one broker
pub struct MqttConnector {
    address: BrokerAddress,
    config: BrokerSection,
}

impl MqttConnector {
    pub fn new(config: &BridgeConfig) -> Result<Self, ConfigurationError> {
        Ok(Self {
            address: config.broker_address()?,
            config: config.broker.clone(),
        })
    }

    pub fn address(&self) -> &BrokerAddress {
        &self.address
    }
}

#[async_trait]
impl Connector for MqttConnector {
    type Session = MqttSession;

    async fn connect(&mut self, client_id: &str) -> Result<MqttSession, TransportError> {
        let options = configure_mqtt_options(client_id, &self.address, &self.config);
        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        event_loop.set_network_options(configure_network_options(&self.config));

        let mut session = MqttSession {
            client,
            event_loop,
            pending: VecDeque::new(),
        };
        session.wait_for_connack().await?;

        info!(
            client_id = %client_id,
            broker = %self.address,
            "MQTT session established"
        );
        Ok(session)
    }
}

/// One live rumqttc client plus its event loop
pub struct MqttSession {
    client: AsyncClient,
    event_loop: EventLoop,
    // Publishes that arrived while waiting for SUBACK
    pending: VecDeque<InboundMessage>,
}

impl MqttSession {
    async fn poll(&mut self, phase: SessionPhase) -> Result<Event, TransportError> {
        self.event_loop
            .poll()
            .await
            .map_err(|e| MessageHandler::classify_connection_error(&e, phase))
    }

    async fn wait_for_connack(&mut self) -> Result<(), TransportError> {
        loop {
            let event = self.poll(SessionPhase::Establishing).await?;
            match MessageHandler::route_mqtt_event(&event) {
                EventRoute::ConnectionAcknowledged { code } => {
                    return MessageHandler::validate_connack(code);
                }
                EventRoute::Disconnected => {
                    return Err(TransportError::connect_failed(
                        "broker closed the connection before CONNACK",
                    ));
                }
                route => debug!(target: "mqtt_transport", "Pre-CONNACK event: {:?}", route),
            }
        }
    }
}

#[async_trait]
impl Session for MqttSession {
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::connect_failed(format!("subscribe request failed: {e}")))?;

        loop {
            let event = self.poll(SessionPhase::Establishing).await?;
            match MessageHandler::route_mqtt_event(&event) {
                EventRoute::SubscriptionAcknowledged { return_codes } => {
                    MessageHandler::validate_subscription_success(&return_codes)?;
                    debug!(target: "mqtt_transport", topic = %topic, "Subscription confirmed");
                    return Ok(());
                }
                EventRoute::MessageReceived {
                    topic,
                    payload,
                    retain,
                } => self.pending.push_back(InboundMessage {
                    topic,
                    payload,
                    retain,
                }),
                EventRoute::Disconnected => {
                    return Err(TransportError::unexpected_close(
                        "broker closed the connection before SUBACK",
                    ));
                }
                _ => {}
            }
        }
    }

    async fn next_message(&mut self) -> Result<InboundMessage, TransportError> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }

        loop {
            let event = self.poll(SessionPhase::Established).await?;
            match MessageHandler::route_mqtt_event(&event) {
                EventRoute::MessageReceived {
                    topic,
                    payload,
                    retain,
                } => {
                    debug!(target: "mqtt_transport", "Received MQTT message on topic: {}", topic);
                    return Ok(InboundMessage {
                        topic,
                        payload,
                        retain,
                    });
                }
                EventRoute::Disconnected => {
                    return Err(TransportError::unexpected_close("broker sent DISCONNECT"));
                }
                EventRoute::InfrastructureEvent(event_str) => {
                    debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                }
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("DISCONNECT could not be queued: {}", e);
            return;
        }

        let flush = async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, flush).await.is_err() {
            warn!("MQTT DISCONNECT was not flushed within {:?}", CLOSE_FLUSH_TIMEOUT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_rejects_invalid_broker_url() {
        let mut config = BridgeConfig::default();
        config.broker.broker_url = "localhost:1883".to_string();

        assert!(matches!(
            MqttConnector::new(&config),
            Err(ConfigurationError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_connector_uses_configured_address() {
        let mut config = BridgeConfig::default();
        config.broker.broker_url = "tcp://127.0.0.1:1884".to_string();

        let connector = MqttConnector::new(&config).unwrap();
        assert_eq!(connector.address().to_string(), "tcp://127.0.0.1:1884");
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_broker_fails() {
        let mut config = BridgeConfig::default();
        // Port 1 is reserved and refuses connections on loopback
        config.broker.broker_url = "tcp://127.0.0.1:1".to_string();
        let mut connector = MqttConnector::new(&config).unwrap();

        let result =
            tokio::time::timeout(Duration::from_secs(5), connector.connect("tbridge-test")).await;

        match result {
            Ok(Err(TransportError::ConnectFailed(_))) | Ok(Err(TransportError::Timeout(_))) => {}
            Ok(Err(other)) => panic!("unexpected error kind: {other:?}"),
            Ok(Ok(_)) => panic!("connect to port 1 should not succeed"),
            Err(_) => {} // some sandboxes drop instead of refusing
        }
    }

    /// Listener that accepts TCP connections and never answers CONNECT
    async fn silent_broker() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("tcp://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (url, handle)
    }

    async fn time_connect(connect_timeout_secs: u64) -> (Duration, Result<(), TransportError>) {
        let (url, broker) = silent_broker().await;
        let mut config = BridgeConfig::default();
        config.broker.broker_url = url;
        config.broker.connect_timeout_secs = connect_timeout_secs;
        let mut connector = MqttConnector::new(&config).unwrap();

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(connect_timeout_secs + 5),
            connector.connect("tbridge-silent"),
        )
        .await
        .expect("connect must give up on its own");
        broker.abort();

        (started.elapsed(), result.map(|_| ()))
    }

    #[tokio::test]
    async fn test_connect_waits_for_configured_timeout_beyond_default() {
        let (elapsed, result) = time_connect(7).await;

        assert!(
            matches!(result, Err(TransportError::Timeout(_))),
            "unexpected result: {result:?}"
        );
        assert!(
            elapsed >= Duration::from_millis(6500),
            "gave up after {elapsed:?} with a 7s timeout configured"
        );
    }

    #[tokio::test]
    async fn test_connect_gives_up_at_short_configured_timeout() {
        let (elapsed, result) = time_connect(1).await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
        assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    }
}
