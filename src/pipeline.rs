//! Decoder, state machine and sink wiring for one inbound message
//!
//! Runs synchronously on the supervisor's worker. Nothing here awaits, so a
//! message is fully reflected in the sink before the next one is read.

use crate::alert::{AlertStateMachine, DisplayState};
use crate::message_span;
use crate::observability::metrics;
use crate::protocol::{decode_at, payload_preview, topic_matches, SensorStatus};
use crate::sink::{EventSink, LogCategory, LogLine};
use crate::transport::InboundMessage;
use chrono::{DateTime, Utc};
use tracing::debug;

/// What happened to one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Decoded and reflected in a new display state
    Applied { alert_triggered: bool },
    /// Payload could not be decoded; logged and dropped
    DecodeFailed,
    /// Topic outside the subscription filter
    Ignored,
}

/// Per-supervisor message pipeline
#[derive(Debug)]
pub struct MessagePipeline {
    topic_filter: String,
    machine: AlertStateMachine,
}

impl MessagePipeline {
    pub fn new<T: Into<String>>(topic_filter: T) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            machine: AlertStateMachine::new(),
        }
    }

    pub fn current(&self) -> &DisplayState {
        self.machine.current()
    }

    /// Process one message received at the current time
    pub fn handle<S: EventSink + ?Sized>(
        &mut self,
        message: &InboundMessage,
        sink: &S,
    ) -> PipelineOutcome {
        self.handle_at(message, Utc::now(), sink)
    }

    /// Process one message with an explicit receive timestamp
    pub fn handle_at<S: EventSink + ?Sized>(
        &mut self,
        message: &InboundMessage,
        received_at: DateTime<Utc>,
        sink: &S,
    ) -> PipelineOutcome {
        let span = message_span!(topic = %message.topic, retain = message.retain);
        let _entered = span.enter();
        metrics().message_received();

        if !topic_matches(&self.topic_filter, &message.topic) {
            debug!(
                filter = %self.topic_filter,
                "Ignoring message outside the subscription filter"
            );
            metrics().message_ignored();
            return PipelineOutcome::Ignored;
        }

        let event = match decode_at(&message.payload, received_at) {
            Ok(event) => event,
            Err(e) => {
                metrics().decode_failed();
                sink.on_log(LogLine::warn(
                    LogCategory::Decode,
                    format!(
                        "Dropped payload ({}): {} [payload: {}]",
                        e.kind(),
                        e,
                        payload_preview(&message.payload)
                    ),
                ));
                return PipelineOutcome::DecodeFailed;
            }
        };

        sink.on_log(LogLine::info(
            LogCategory::Message,
            format!("RX: [{}] Val: {}", event.status_token(), event.raw_value()),
        ));

        if event.status() == SensorStatus::Unknown {
            metrics().unknown_status();
            sink.on_log(LogLine::warn(
                LogCategory::Decode,
                format!("Unrecognized status '{}'", event.status_token()),
            ));
        }
        if !event.is_numeric() {
            metrics().non_numeric_value();
            sink.on_log(LogLine::warn(
                LogCategory::Decode,
                format!(
                    "Non-numeric value '{}' for status {}",
                    event.raw_value(),
                    event.status_token()
                ),
            ));
        }

        let change = self.machine.apply(&event);
        if let Some(transition) = &change.transition {
            metrics().severity_changed();
            sink.on_log(LogLine::info(LogCategory::Alert, transition.to_string()));
        }

        let alert_triggered = change.state.alert_triggered();
        if alert_triggered {
            metrics().alert_triggered();
        }
        sink.on_display_state(change.state);

        PipelineOutcome::Applied { alert_triggered }
    }

    /// Downgrade the display after the broker session ended
    pub fn go_offline<S: EventSink + ?Sized>(&mut self, reason: &str, sink: &S) {
        let change = self.machine.go_offline(reason, Utc::now());
        if let Some(transition) = &change.transition {
            sink.on_log(LogLine::info(LogCategory::Alert, transition.to_string()));
        }
        sink.on_display_state(change.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Severity;
    use crate::testing::RecordingSink;

    const TOPIC: &str = "virtusense/unique_id_123/alert_output";

    fn message(payload: &'static [u8]) -> InboundMessage {
        InboundMessage::new(TOPIC, payload)
    }

    #[test]
    fn test_idle_message_reaches_sink_with_receipt_log() {
        let sink = RecordingSink::new();
        let mut pipeline = MessagePipeline::new(TOPIC);

        let outcome = pipeline.handle(&message(b"IDLE:1200"), &sink);
        assert_eq!(
            outcome,
            PipelineOutcome::Applied {
                alert_triggered: false
            }
        );

        let states = sink.display_states();
        assert_eq!(states.len(), 1);
        assert!(states[0].label().contains("IDLE"));
        assert_eq!(states[0].severity(), Severity::Info);
        assert!(!states[0].alert_triggered());

        let logs = sink.log_messages();
        assert!(logs.iter().any(|l| l == "RX: [IDLE] Val: 1200"));
    }

    #[test]
    fn test_fault_logs_severity_transition() {
        let sink = RecordingSink::new();
        let mut pipeline = MessagePipeline::new(TOPIC);

        pipeline.handle(&message(b"NORMAL:2000"), &sink);
        let outcome = pipeline.handle(&message(b"FAULT:3900"), &sink);

        assert_eq!(
            outcome,
            PipelineOutcome::Applied {
                alert_triggered: true
            }
        );
        let logs = sink.log_messages();
        assert!(logs.iter().any(|l| l == "severity OK -> ERROR (FAULT)"));
    }

    #[test]
    fn test_decode_failure_is_logged_not_applied() {
        let sink = RecordingSink::new();
        let mut pipeline = MessagePipeline::new(TOPIC);

        assert_eq!(
            pipeline.handle(&message(b"weird"), &sink),
            PipelineOutcome::DecodeFailed
        );
        assert_eq!(
            pipeline.handle(&message(b""), &sink),
            PipelineOutcome::DecodeFailed
        );

        assert!(sink.display_states().is_empty());
        let logs = sink.log_messages();
        assert_eq!(logs.len(), 2);
        assert!(logs[0].contains("malformed"));
        assert!(logs[0].contains("weird"));
        assert!(logs[1].contains("empty_payload"));
    }

    #[test]
    fn test_unknown_and_non_numeric_are_flagged() {
        let sink = RecordingSink::new();
        let mut pipeline = MessagePipeline::new(TOPIC);

        pipeline.handle(&message(b"OVERHEAT:abc"), &sink);

        let states = sink.display_states();
        assert_eq!(states[0].severity(), Severity::Warn);
        let logs = sink.log_messages();
        assert!(logs.iter().any(|l| l == "Unrecognized status 'OVERHEAT'"));
        assert!(logs.iter().any(|l| l.starts_with("Non-numeric value 'abc'")));
    }

    #[test]
    fn test_messages_outside_filter_are_ignored() {
        let sink = RecordingSink::new();
        let mut pipeline = MessagePipeline::new("plant/+/alert_output");

        let outcome = pipeline.handle(&InboundMessage::new("plant/a/other", "FAULT:1"), &sink);
        assert_eq!(outcome, PipelineOutcome::Ignored);

        let outcome =
            pipeline.handle(&InboundMessage::new("plant/a/alert_output", "FAULT:1"), &sink);
        assert_eq!(
            outcome,
            PipelineOutcome::Applied {
                alert_triggered: true
            }
        );
        assert_eq!(sink.display_states().len(), 1);
    }

    #[test]
    fn test_go_offline_downgrades_display() {
        let sink = RecordingSink::new();
        let mut pipeline = MessagePipeline::new(TOPIC);

        pipeline.handle(&message(b"FAULT:3900"), &sink);
        pipeline.go_offline("Connection lost", &sink);

        let states = sink.display_states();
        assert!(states.last().unwrap().is_offline());
        assert!(pipeline.current().is_offline());
        assert!(sink
            .log_messages()
            .iter()
            .any(|l| l == "severity ERROR -> OFFLINE (connection lost)"));
    }
}
