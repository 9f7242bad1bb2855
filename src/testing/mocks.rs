//! Mock implementations for testing
//!
//! Provides a scripted connector/session pair and a recording sink so the
//! supervisor can be driven end to end without a broker.

use crate::alert::DisplayState;
use crate::error::TransportError;
use crate::sink::{EventSink, LogLine, SinkEvent};
use crate::supervisor::ConnectionState;
use crate::transport::{Connector, InboundMessage, Session};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How long the `wait_for_*` helpers wait before failing the test
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct AttemptRecord {
    client_ids: Vec<String>,
    subscriptions: Vec<String>,
    closed: usize,
}

/// Shared record of what the supervisor asked the transport to do
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    inner: Arc<Mutex<AttemptRecord>>,
}

impl AttemptLog {
    /// Connection attempts made so far
    pub fn count(&self) -> usize {
        lock(&self.inner).client_ids.len()
    }

    pub fn client_ids(&self) -> Vec<String> {
        lock(&self.inner).client_ids.clone()
    }

    /// Topics subscribed, one entry per subscribe call
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.inner).subscriptions.clone()
    }

    /// Sessions closed through `Session::close`
    pub fn closed(&self) -> usize {
        lock(&self.inner).closed
    }
}

/// What a scripted session does once its queued messages run out
#[derive(Debug, Clone)]
enum SessionTail {
    Pending,
    Fail(TransportError),
}

/// Session that replays a fixed list of messages
#[derive(Debug)]
pub struct ScriptedSession {
    messages: VecDeque<InboundMessage>,
    tail: SessionTail,
    subscribe_error: Option<TransportError>,
    log: AttemptLog,
}

impl ScriptedSession {
    pub fn new(messages: Vec<InboundMessage>) -> Self {
        Self {
            messages: messages.into(),
            tail: SessionTail::Pending,
            subscribe_error: None,
            log: AttemptLog::default(),
        }
    }

    /// Fail `next_message` with `error` after the queued messages
    pub fn then_fail(mut self, error: TransportError) -> Self {
        self.tail = SessionTail::Fail(error);
        self
    }

    /// Reject the subscription with `error`
    pub fn reject_subscribe(mut self, error: TransportError) -> Self {
        self.subscribe_error = Some(error);
        self
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        lock(&self.log.inner).subscriptions.push(topic.to_string());
        match self.subscribe_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn next_message(&mut self) -> Result<InboundMessage, TransportError> {
        if let Some(message) = self.messages.pop_front() {
            // Let the shutdown branch observe the runtime between messages
            tokio::task::yield_now().await;
            return Ok(message);
        }
        match &self.tail {
            SessionTail::Pending => std::future::pending().await,
            SessionTail::Fail(error) => Err(error.clone()),
        }
    }

    async fn close(&mut self) {
        lock(&self.log.inner).closed += 1;
    }
}

/// Connector that plays back a script of connect outcomes.
///
/// Once the script is exhausted every further `connect` hangs, which keeps
/// tests free of busy reconnect loops.
#[derive(Debug)]
pub struct ScriptedConnector {
    script: VecDeque<Result<ScriptedSession, TransportError>>,
    log: AttemptLog,
}

impl ScriptedConnector {
    pub fn new(script: Vec<Result<ScriptedSession, TransportError>>) -> Self {
        Self {
            script: script.into(),
            log: AttemptLog::default(),
        }
    }

    /// Fail `failures` times with `ConnectFailed`, then hand out `session`
    pub fn failing_then(failures: usize, session: ScriptedSession) -> Self {
        let mut script: Vec<_> = (0..failures)
            .map(|i| Err(TransportError::connect_failed(format!("scripted failure {}", i + 1))))
            .collect();
        script.push(Ok(session));
        Self::new(script)
    }

    /// Every connect hangs until cancelled
    pub fn hanging() -> Self {
        Self::new(Vec::new())
    }

    pub fn attempts(&self) -> AttemptLog {
        self.log.clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Session = ScriptedSession;

    async fn connect(&mut self, client_id: &str) -> Result<ScriptedSession, TransportError> {
        lock(&self.log.inner).client_ids.push(client_id.to_string());
        match self.script.pop_front() {
            Some(Ok(mut session)) => {
                session.log = self.log.clone();
                Ok(session)
            }
            Some(Err(error)) => Err(error),
            None => std::future::pending().await,
        }
    }
}

/// Sink that records every callback in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        lock(&self.events).clone()
    }

    pub fn display_states(&self) -> Vec<DisplayState> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                SinkEvent::DisplayState(state) => Some(state.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connection_states(&self) -> Vec<ConnectionState> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                SinkEvent::ConnectionState(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<LogLine> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Log(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn log_messages(&self) -> Vec<String> {
        self.logs().into_iter().map(|line| line.message).collect()
    }

    pub fn backoffs(&self) -> Vec<(u32, Duration)> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Backoff { attempt, delay } => Some((*attempt, *delay)),
                _ => None,
            })
            .collect()
    }

    /// Poll until `condition` holds, panicking after [`WAIT_TIMEOUT`]
    pub async fn wait_until<F: Fn(&Self) -> bool>(&self, what: &str, condition: F) {
        let result = tokio::time::timeout(WAIT_TIMEOUT, async {
            while !condition(self) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        if result.is_err() {
            panic!("timed out waiting for {what}; recorded events: {:#?}", self.events());
        }
    }

    pub async fn wait_for_display_states(&self, count: usize) {
        self.wait_until(&format!("{count} display states"), |sink| {
            sink.display_states().len() >= count
        })
        .await
    }

    pub async fn wait_for_log_containing(&self, needle: &str) {
        self.wait_until(&format!("a log line containing '{needle}'"), |sink| {
            sink.log_messages().iter().any(|line| line.contains(needle))
        })
        .await
    }

    pub async fn wait_for_connection_state(&self, state: ConnectionState) {
        self.wait_until(&format!("connection state {state}"), |sink| {
            sink.connection_states().contains(&state)
        })
        .await
    }

    fn record(&self, event: SinkEvent) {
        lock(&self.events).push(event);
    }
}

impl EventSink for RecordingSink {
    fn on_display_state(&self, state: DisplayState) {
        self.record(SinkEvent::DisplayState(state));
    }

    fn on_log(&self, entry: LogLine) {
        self.record(SinkEvent::Log(entry));
    }

    fn on_connection_state(&self, state: ConnectionState) {
        self.record(SinkEvent::ConnectionState(state));
    }

    fn on_backoff(&self, attempt: u32, delay: Duration) {
        self.record(SinkEvent::Backoff { attempt, delay });
    }
}
