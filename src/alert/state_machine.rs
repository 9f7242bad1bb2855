//! Sensor status to display state mapping
//!
//! [`transition`] is a pure function of `(previous state, event)`. The
//! [`AlertStateMachine`] wraps it with the last published state and a bounded
//! history of severity changes used for audit logging.

use crate::protocol::{SensorEvent, SensorStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Number of severity changes retained for audit
pub const HISTORY_LIMIT: usize = 64;

pub const LABEL_FAULT: &str = "FAULT DETECTED";
pub const LABEL_IDLE: &str = "IDLE MODE";
pub const LABEL_NORMAL: &str = "OPERATIONAL";
pub const LABEL_UNKNOWN: &str = "UNKNOWN STATUS";
pub const LABEL_OFFLINE: &str = "OFFLINE";

/// Ordinal classification of a display state.
///
/// `Offline` is never produced from sensor data; it marks states derived from
/// the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Offline,
    Ok,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Offline => "OFFLINE",
            Severity::Ok => "OK",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// Card colour used by the presentation layer
    pub fn color_hex(&self) -> &'static str {
        match self {
            Severity::Offline => "#333333",
            Severity::Ok => "#388E3C",
            Severity::Info => "#1976D2",
            Severity::Warn => "#F57C00",
            Severity::Error => "#D32F2F",
        }
    }

    pub fn is_sensor_derived(&self) -> bool {
        !matches!(self, Severity::Offline)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SensorStatus> for Severity {
    fn from(status: SensorStatus) -> Self {
        match status {
            SensorStatus::Fault => Severity::Error,
            SensorStatus::Idle => Severity::Info,
            SensorStatus::Normal => Severity::Ok,
            SensorStatus::Unknown => Severity::Warn,
        }
    }
}

/// Externally visible application state.
///
/// Values are immutable once built; every update is a whole new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    label: String,
    subtext: String,
    severity: Severity,
    alert_triggered: bool,
    updated_at: DateTime<Utc>,
}

impl DisplayState {
    /// Connection-derived state shown while no sensor data can arrive
    pub fn offline<S: Into<String>>(reason: S, at: DateTime<Utc>) -> Self {
        Self {
            label: LABEL_OFFLINE.to_string(),
            subtext: reason.into(),
            severity: Severity::Offline,
            alert_triggered: false,
            updated_at: at,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn subtext(&self) -> &str {
        &self.subtext
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// True when the presentation layer should fire the haptic/visual alarm
    pub fn alert_triggered(&self) -> bool {
        self.alert_triggered
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_offline(&self) -> bool {
        self.severity == Severity::Offline
    }
}

/// Map a decoded event to the next display state.
///
/// Every FAULT event triggers the alert, not only the first one of a run.
pub fn transition(_prev: &DisplayState, event: &SensorEvent) -> DisplayState {
    let status = event.status();
    let label = match status {
        SensorStatus::Fault => LABEL_FAULT,
        SensorStatus::Idle => LABEL_IDLE,
        SensorStatus::Normal => LABEL_NORMAL,
        SensorStatus::Unknown => LABEL_UNKNOWN,
    };

    let mut subtext = format!("Sensor Reading: {}", event.raw_value());
    if status == SensorStatus::Unknown {
        subtext.push_str(&format!(" (status '{}')", event.status_token()));
    }
    if !event.is_numeric() {
        subtext.push_str(" (non-numeric)");
    }

    DisplayState {
        label: label.to_string(),
        subtext,
        severity: Severity::from(status),
        alert_triggered: status == SensorStatus::Fault,
        updated_at: event.received_at(),
    }
}

/// A change of severity between two consecutive display states
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeverityTransition {
    pub from: Severity,
    pub to: Severity,
    pub cause: String,
    pub at: DateTime<Utc>,
}

impl fmt::Display for SeverityTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "severity {} -> {} ({})", self.from, self.to, self.cause)
    }
}

/// Result of feeding one input into the state machine
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub state: DisplayState,
    pub transition: Option<SeverityTransition>,
}

/// Owner of the last published [`DisplayState`]
#[derive(Debug, Clone)]
pub struct AlertStateMachine {
    current: DisplayState,
    history: VecDeque<SeverityTransition>,
}

impl AlertStateMachine {
    pub fn new() -> Self {
        Self::with_initial(DisplayState::offline("Waiting for broker connection", Utc::now()))
    }

    pub fn with_initial(initial: DisplayState) -> Self {
        Self {
            current: initial,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    pub fn current(&self) -> &DisplayState {
        &self.current
    }

    /// Severity changes, oldest first
    pub fn history(&self) -> impl Iterator<Item = &SeverityTransition> {
        self.history.iter()
    }

    /// Apply a decoded sensor event
    pub fn apply(&mut self, event: &SensorEvent) -> StateChange {
        let next = transition(&self.current, event);
        self.replace(next, event.status().as_str().to_string())
    }

    /// Downgrade to the offline state after the broker session ends
    pub fn go_offline(&mut self, reason: &str, at: DateTime<Utc>) -> StateChange {
        self.replace(DisplayState::offline(reason, at), "connection lost".to_string())
    }

    fn replace(&mut self, next: DisplayState, cause: String) -> StateChange {
        let transition = (next.severity != self.current.severity).then(|| SeverityTransition {
            from: self.current.severity,
            to: next.severity,
            cause,
            at: next.updated_at,
        });

        if let Some(ref change) = transition {
            if self.history.len() == HISTORY_LIMIT {
                self.history.pop_front();
            }
            self.history.push_back(change.clone());
        }

        self.current = next.clone();
        StateChange {
            state: next,
            transition,
        }
    }
}

impl Default for AlertStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;
    use proptest::prelude::*;

    fn event(payload: &str) -> SensorEvent {
        decode(payload.as_bytes()).unwrap()
    }

    fn offline() -> DisplayState {
        DisplayState::offline("test", Utc::now())
    }

    #[test]
    fn test_mapping_table() {
        let prev = offline();

        let state = transition(&prev, &event("FAULT:3900"));
        assert_eq!(state.severity(), Severity::Error);
        assert!(state.alert_triggered());
        assert_eq!(state.label(), LABEL_FAULT);

        let state = transition(&prev, &event("IDLE:512"));
        assert_eq!(state.severity(), Severity::Info);
        assert!(!state.alert_triggered());
        assert!(state.label().contains("IDLE"));

        let state = transition(&prev, &event("NORMAL:2000"));
        assert_eq!(state.severity(), Severity::Ok);
        assert!(!state.alert_triggered());
        assert_eq!(state.label(), LABEL_NORMAL);

        let state = transition(&prev, &event("BOGUS:1"));
        assert_eq!(state.severity(), Severity::Warn);
        assert!(!state.alert_triggered());
        assert_eq!(state.label(), LABEL_UNKNOWN);
    }

    #[test]
    fn test_subtext_annotations() {
        let prev = offline();

        let state = transition(&prev, &event("NORMAL:2000"));
        assert_eq!(state.subtext(), "Sensor Reading: 2000");

        let state = transition(&prev, &event("NORMAL:abc"));
        assert_eq!(state.subtext(), "Sensor Reading: abc (non-numeric)");

        let state = transition(&prev, &event("SMOKE:7"));
        assert_eq!(state.subtext(), "Sensor Reading: 7 (status 'SMOKE')");
    }

    #[test]
    fn test_transition_is_deterministic() {
        let prev = offline();
        let e = event("IDLE:1200");
        assert_eq!(transition(&prev, &e), transition(&prev, &e));
    }

    #[test]
    fn test_repeated_faults_keep_alerting() {
        let mut machine = AlertStateMachine::new();

        let first = machine.apply(&event("FAULT:3900"));
        let second = machine.apply(&event("FAULT:4000"));

        assert!(first.state.alert_triggered());
        assert!(second.state.alert_triggered());
        assert!(first.transition.is_some());
        // Severity unchanged, so no new history entry
        assert!(second.transition.is_none());
    }

    #[test]
    fn test_history_records_severity_changes() {
        let mut machine = AlertStateMachine::new();
        machine.apply(&event("NORMAL:2000"));
        machine.apply(&event("NORMAL:2100"));
        machine.apply(&event("FAULT:3900"));
        machine.go_offline("broker closed connection", Utc::now());

        let history: Vec<String> = machine.history().map(|t| t.to_string()).collect();
        assert_eq!(
            history,
            vec![
                "severity OFFLINE -> OK (NORMAL)",
                "severity OK -> ERROR (FAULT)",
                "severity ERROR -> OFFLINE (connection lost)",
            ]
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let mut machine = AlertStateMachine::new();
        for i in 0..(HISTORY_LIMIT * 2) {
            let payload = if i % 2 == 0 { "FAULT:1" } else { "NORMAL:1" };
            machine.apply(&event(payload));
        }
        assert_eq!(machine.history().count(), HISTORY_LIMIT);
    }

    #[test]
    fn test_go_offline_downgrades() {
        let mut machine = AlertStateMachine::new();
        machine.apply(&event("FAULT:3900"));

        let change = machine.go_offline("keepalive timeout", Utc::now());
        assert!(change.state.is_offline());
        assert!(!change.state.alert_triggered());
        assert_eq!(change.state.label(), LABEL_OFFLINE);
        assert_eq!(change.state.subtext(), "keepalive timeout");
        assert_eq!(machine.current(), &change.state);
    }

    #[test]
    fn test_initial_state_is_offline() {
        let machine = AlertStateMachine::default();
        assert!(machine.current().is_offline());
        assert_eq!(machine.history().count(), 0);
    }

    #[test]
    fn test_severity_ordering_and_colors() {
        assert!(Severity::Offline < Severity::Ok);
        assert!(Severity::Ok < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert_eq!(Severity::Error.color_hex(), "#D32F2F");
        assert!(!Severity::Offline.is_sensor_derived());
        assert!(Severity::Warn.is_sensor_derived());
    }

    proptest! {
        #[test]
        fn fault_always_alerts_regardless_of_prior(
            prior in prop_oneof!["FAULT", "IDLE", "NORMAL", "[A-Z]{1,6}"],
            value in "[0-9]{1,4}",
        ) {
            let mut machine = AlertStateMachine::new();
            machine.apply(&event(&format!("{prior}:{value}")));

            let change = machine.apply(&event(&format!("FAULT:{value}")));
            prop_assert_eq!(change.state.severity(), Severity::Error);
            prop_assert!(change.state.alert_triggered());
        }

        #[test]
        fn only_fault_alerts(status in "[A-Z]{1,8}") {
            let state = transition(&offline(), &event(&format!("{status}:1")));
            prop_assert_eq!(state.alert_triggered(), status == "FAULT");
        }
    }
}
