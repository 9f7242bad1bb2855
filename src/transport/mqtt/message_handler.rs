//! Pure event routing and error classification for the MQTT transport
//!
//! This module contains pure functions that map rumqttc events and
//! connection errors onto the bridge's transport vocabulary.

use crate::error::TransportError;
use rumqttc::{ConnectReturnCode, ConnectionError, Event, Packet, StateError, SubscribeReasonCode};
use tracing::debug;

/// Which phase of a session an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport handshake or subscription not yet acknowledged
    Establishing,
    /// Subscribed and reading messages
    Established,
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker answered CONNECT
    ConnectionAcknowledged { code: ConnectReturnCode },
    /// Message received on a subscribed topic
    MessageReceived {
        topic: String,
        payload: bytes::Bytes,
        retain: bool,
    },
    /// Broker answered SUBSCRIBE
    SubscriptionAcknowledged { return_codes: Vec<SubscribeReasonCode> },
    /// Broker closed the session
    Disconnected,
    /// Keepalive answer and other protocol traffic
    InfrastructureEvent(String),
    /// Packet written by the client
    OutgoingEvent,
}

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged { code: connack.code },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                },
                Packet::SubAck(suback) => EventRoute::SubscriptionAcknowledged {
                    return_codes: suback.return_codes.clone(),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Check a CONNACK return code
    pub fn validate_connack(code: ConnectReturnCode) -> Result<(), TransportError> {
        match code {
            ConnectReturnCode::Success => Ok(()),
            refused => Err(Self::classify_refusal(refused)),
        }
    }

    /// Check that every requested subscription was granted
    pub fn validate_subscription_success(
        return_codes: &[SubscribeReasonCode],
    ) -> Result<(), TransportError> {
        if return_codes.is_empty() {
            return Err(TransportError::unexpected_close(
                "subscription acknowledged without return codes",
            ));
        }
        if return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            return Err(TransportError::auth_rejected(format!(
                "broker refused subscription: {return_codes:?}"
            )));
        }
        Ok(())
    }

    /// Map a rumqttc connection error onto the transport taxonomy
    pub fn classify_connection_error(error: &ConnectionError, phase: SessionPhase) -> TransportError {
        debug!(?phase, "Classifying MQTT connection error: {:?}", error);
        match error {
            ConnectionError::ConnectionRefused(code) => Self::classify_refusal(*code),
            ConnectionError::MqttState(StateError::AwaitPingResp) => {
                TransportError::timeout("broker did not answer keepalive ping")
            }
            ConnectionError::NetworkTimeout => TransportError::timeout("network timeout"),
            other => match phase {
                SessionPhase::Establishing => TransportError::connect_failed(other.to_string()),
                SessionPhase::Established => TransportError::unexpected_close(other.to_string()),
            },
        }
    }

    fn classify_refusal(code: ConnectReturnCode) -> TransportError {
        match code {
            ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
                TransportError::auth_rejected(format!("connection refused: {code:?}"))
            }
            other => TransportError::connect_failed(format!("connection refused: {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Outgoing, Publish, QoS, SubAck};

    #[test]
    fn test_route_connack() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::ConnectionAcknowledged {
                code: ConnectReturnCode::Success
            }
        );
    }

    #[test]
    fn test_route_publish() {
        let mut publish = Publish::new("sensors/alert", QoS::AtLeastOnce, "FAULT:3900");
        publish.retain = true;
        let event = Event::Incoming(Packet::Publish(publish));

        if let EventRoute::MessageReceived {
            topic,
            payload,
            retain,
        } = MessageHandler::route_mqtt_event(&event)
        {
            assert_eq!(topic, "sensors/alert");
            assert_eq!(payload.as_ref(), b"FAULT:3900");
            assert!(retain);
        } else {
            panic!("Expected MessageReceived route");
        }
    }

    #[test]
    fn test_route_suback_disconnect_and_infrastructure() {
        let suback = Event::Incoming(Packet::SubAck(SubAck::new(
            1,
            vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)],
        )));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&suback),
            EventRoute::SubscriptionAcknowledged { .. }
        ));

        let disconnect = Event::Incoming(Packet::Disconnect);
        assert_eq!(
            MessageHandler::route_mqtt_event(&disconnect),
            EventRoute::Disconnected
        );

        let pingresp = Event::Incoming(Packet::PingResp);
        assert!(matches!(
            MessageHandler::route_mqtt_event(&pingresp),
            EventRoute::InfrastructureEvent(_)
        ));

        let outgoing = Event::Outgoing(Outgoing::PingReq);
        assert_eq!(
            MessageHandler::route_mqtt_event(&outgoing),
            EventRoute::OutgoingEvent
        );
    }

    #[test]
    fn test_validate_connack() {
        assert!(MessageHandler::validate_connack(ConnectReturnCode::Success).is_ok());
        assert!(matches!(
            MessageHandler::validate_connack(ConnectReturnCode::NotAuthorized),
            Err(TransportError::AuthRejected(_))
        ));
        assert!(matches!(
            MessageHandler::validate_connack(ConnectReturnCode::BadUserNamePassword),
            Err(TransportError::AuthRejected(_))
        ));
        assert!(matches!(
            MessageHandler::validate_connack(ConnectReturnCode::ServiceUnavailable),
            Err(TransportError::ConnectFailed(_))
        ));
    }

    #[test]
    fn test_validate_subscription_success() {
        assert!(MessageHandler::validate_subscription_success(&[
            SubscribeReasonCode::Success(QoS::AtLeastOnce)
        ])
        .is_ok());

        assert!(matches!(
            MessageHandler::validate_subscription_success(&[SubscribeReasonCode::Failure]),
            Err(TransportError::AuthRejected(_))
        ));

        assert!(MessageHandler::validate_subscription_success(&[]).is_err());
    }

    #[test]
    fn test_classify_connection_errors() {
        let refused = ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized);
        assert!(matches!(
            MessageHandler::classify_connection_error(&refused, SessionPhase::Establishing),
            TransportError::AuthRejected(_)
        ));

        let ping = ConnectionError::MqttState(StateError::AwaitPingResp);
        assert!(matches!(
            MessageHandler::classify_connection_error(&ping, SessionPhase::Established),
            TransportError::Timeout(_)
        ));

        let io = || {
            ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            ))
        };
        assert!(matches!(
            MessageHandler::classify_connection_error(&io(), SessionPhase::Establishing),
            TransportError::ConnectFailed(_)
        ));
        assert!(matches!(
            MessageHandler::classify_connection_error(&io(), SessionPhase::Established),
            TransportError::UnexpectedClose(_)
        ));
    }
}
