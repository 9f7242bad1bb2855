//! Pure connection state transitions
//!
//! The supervisor is the only owner of [`ConnectionState`]. Every change
//! goes through [`next_state`] so the audit text and the state can never
//! disagree.

use crate::error::TransportError;
use serde::Serialize;
use std::fmt;

/// Broker session state as seen by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    /// Inbound messages are only accepted in this state
    pub fn accepts_messages(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs that move the supervisor between states
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A connection attempt is starting
    AttemptStarted { attempt: u32, broker: String },
    /// Handshake and subscription both acknowledged
    SessionEstablished { client_id: String },
    /// The attempt failed before the session was established
    AttemptFailed(TransportError),
    /// An established session ended
    SessionLost(TransportError),
    /// Shutdown was requested
    ShutdownRequested,
}

/// Outcome of applying one [`ConnectionEvent`]
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub description: String,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// A held session ended; the display must be downgraded to offline
    pub fn is_session_loss(&self) -> bool {
        self.from == ConnectionState::Connected && self.to == ConnectionState::Disconnected
    }
}

/// Determine next state after a connection event (pure function)
pub fn next_state(current: ConnectionState, event: &ConnectionEvent) -> Transition {
    let (to, description) = match event {
        ConnectionEvent::AttemptStarted { attempt, broker } => (
            ConnectionState::Connecting,
            format!("Connecting to {broker} (attempt {attempt})"),
        ),
        ConnectionEvent::SessionEstablished { client_id } => (
            ConnectionState::Connected,
            format!("Connected as {client_id}, subscription active"),
        ),
        ConnectionEvent::AttemptFailed(error) => (
            ConnectionState::Disconnected,
            format!("Connection attempt failed: {error}"),
        ),
        ConnectionEvent::SessionLost(error) => (
            ConnectionState::Disconnected,
            format!("Connection lost: {error}"),
        ),
        ConnectionEvent::ShutdownRequested => (
            ConnectionState::Disconnected,
            "Disconnected: shutdown requested".to_string(),
        ),
    };

    Transition {
        from: current,
        to,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let t = next_state(
            ConnectionState::Disconnected,
            &ConnectionEvent::AttemptStarted {
                attempt: 1,
                broker: "tcp://localhost:1883".to_string(),
            },
        );
        assert_eq!(t.to, ConnectionState::Connecting);
        assert!(t.changed());
        assert_eq!(t.description, "Connecting to tcp://localhost:1883 (attempt 1)");

        let t = next_state(
            t.to,
            &ConnectionEvent::SessionEstablished {
                client_id: "tbridge-abc".to_string(),
            },
        );
        assert_eq!(t.to, ConnectionState::Connected);
        assert!(t.to.accepts_messages());

        let t = next_state(
            t.to,
            &ConnectionEvent::SessionLost(TransportError::timeout("no PINGRESP")),
        );
        assert_eq!(t.to, ConnectionState::Disconnected);
        assert!(t.is_session_loss());
        assert!(t.description.starts_with("Connection lost: "));
    }

    #[test]
    fn test_failed_attempt_is_not_a_session_loss() {
        let t = next_state(
            ConnectionState::Connecting,
            &ConnectionEvent::AttemptFailed(TransportError::auth_rejected("bad credentials")),
        );
        assert_eq!(t.to, ConnectionState::Disconnected);
        assert!(!t.is_session_loss());
    }

    #[test]
    fn test_shutdown_from_disconnected_does_not_change_state() {
        let t = next_state(
            ConnectionState::Disconnected,
            &ConnectionEvent::ShutdownRequested,
        );
        assert!(!t.changed());
    }

    #[test]
    fn test_shutdown_while_connected_downgrades_display() {
        let t = next_state(ConnectionState::Connected, &ConnectionEvent::ShutdownRequested);
        assert!(t.changed());
        assert!(t.is_session_loss());
    }

    #[test]
    fn test_state_display_and_serde() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connected).unwrap(),
            "\"connected\""
        );
        assert!(!ConnectionState::Connecting.accepts_messages());
    }
}
