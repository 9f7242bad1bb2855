//! Connection supervisor worker
//!
//! One task owns the broker session end to end: it connects, subscribes,
//! reads messages through the [`MessagePipeline`] and, when the session
//! fails, reports the outage and reconnects with backoff. Only configuration
//! errors stop it; transport errors of every kind are retried.

use super::backoff::{Backoff, BackoffPolicy};
use super::transitions::{next_state, ConnectionEvent, ConnectionState, Transition};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ConfigurationError, TransportError};
use crate::observability::metrics;
use crate::pipeline::MessagePipeline;
use crate::session_span;
use crate::sink::{EventSink, LogCategory, LogLevel, LogLine};
use crate::transport::mqtt::generate_client_id;
use crate::transport::{Connector, Session};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// How long [`SupervisorHandle::shutdown`] waits before aborting the worker
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Why a session's read loop returned
enum SessionEnd {
    Shutdown,
    Lost(TransportError),
}

/// Report a fatal configuration error through the sink
pub fn report_configuration_error<S: EventSink + ?Sized>(sink: &S, error: &ConfigurationError) {
    error!("Fatal configuration error: {}", error);
    sink.on_log(LogLine::error(
        LogCategory::Config,
        format!("Configuration error, bridge not started: {error}"),
    ));
}

/// The connection supervisor
pub struct Supervisor<C: Connector, S: EventSink> {
    config: BridgeConfig,
    connector: C,
    sink: S,
    pipeline: MessagePipeline,
    state: ConnectionState,
    backoff: Backoff,
}

impl<C, S> Supervisor<C, S>
where
    C: Connector,
    S: EventSink,
{
    pub fn new(config: BridgeConfig, connector: C, sink: S) -> Self {
        let pipeline = MessagePipeline::new(config.broker.topic.clone());
        let backoff = Backoff::new(BackoffPolicy::from(&config.backoff));
        Self {
            config,
            connector,
            sink,
            pipeline,
            state: ConnectionState::Disconnected,
            backoff,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run until shutdown is signalled.
    ///
    /// Returns an error only for invalid configuration, which is reported
    /// once through the sink before any connection is attempted.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConfigurationError> {
        if let Err(e) = self.config.validate() {
            report_configuration_error(&self.sink, &e);
            return Err(e);
        }
        let broker = self.config.broker_address()?.to_string();

        info!(
            broker = %broker,
            topic = %self.config.broker.topic,
            "Connection supervisor starting"
        );
        // Initial offline display so the presentation layer never lacks a state
        self.sink
            .on_display_state(self.pipeline.current().clone());
        self.sink.on_connection_state(self.state);

        let mut attempt: u32 = 0;
        let mut wait_before_attempt = false;
        let mut last_session_end: Option<Instant> = None;

        loop {
            if shutdown_requested(&shutdown) {
                break;
            }

            if wait_before_attempt {
                let (wait, delay) = self.backoff.next_delay();
                metrics().backoff_scheduled(delay);
                self.sink.on_backoff(wait, delay);
                self.sink.on_log(LogLine::info(
                    LogCategory::Connection,
                    format!("Reconnecting in {} ms (retry {wait})", delay.as_millis()),
                ));
                if !interruptible_sleep(&mut shutdown, delay).await {
                    break;
                }
            }
            wait_before_attempt = true;

            attempt = attempt.saturating_add(1);
            self.apply(ConnectionEvent::AttemptStarted {
                attempt,
                broker: broker.clone(),
            });
            metrics().connection_attempt();

            let client_id = generate_client_id(&self.config.broker.client_id_prefix);
            let connect_timeout = self.config.connect_timeout();

            let established = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => None,
                result = tokio::time::timeout(connect_timeout, establish(
                    &mut self.connector,
                    &client_id,
                    &self.config.broker.topic,
                )) => Some(result),
            };

            let mut session = match established {
                None => break,
                Some(Ok(Ok(session))) => session,
                Some(Ok(Err(e))) => {
                    self.attempt_failed(e);
                    continue;
                }
                Some(Err(_elapsed)) => {
                    self.attempt_failed(TransportError::timeout(format!(
                        "no acknowledgment within {}s",
                        connect_timeout.as_secs()
                    )));
                    continue;
                }
            };

            metrics().connection_established();
            self.backoff.reset();
            self.apply(ConnectionEvent::SessionEstablished {
                client_id: client_id.clone(),
            });
            if let Some(ended) = last_session_end {
                self.sink.on_log(LogLine::warn(
                    LogCategory::Connection,
                    format!(
                        "Session restored after {:.1}s offline; messages published during the gap were not replayed",
                        ended.elapsed().as_secs_f64()
                    ),
                ));
            }

            let span = session_span!(client_id = %client_id, broker = %broker);
            let end = self
                .read_session(&mut session, &mut shutdown)
                .instrument(span)
                .await;

            match end {
                SessionEnd::Shutdown => {
                    session.close().await;
                    break;
                }
                SessionEnd::Lost(e) => {
                    // Dropping the failed session releases it; no DISCONNECT is owed
                    drop(session);
                    metrics().session_lost();
                    last_session_end = Some(Instant::now());
                    let reason = format!("Connection lost: {e}");
                    if self.apply(ConnectionEvent::SessionLost(e)).is_session_loss() {
                        self.pipeline.go_offline(&reason, &self.sink);
                    }
                }
            }
        }

        self.finish_shutdown();
        Ok(())
    }

    /// Spawn the worker on the tokio runtime
    pub fn spawn(self) -> SupervisorHandle
    where
        C: 'static,
        C::Session: 'static,
        S: 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(shutdown_rx));
        SupervisorHandle {
            shutdown_tx,
            handle,
        }
    }

    async fn read_session(
        &mut self,
        session: &mut C::Session,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => return SessionEnd::Shutdown,
                next = session.next_message() => match next {
                    Ok(message) => {
                        debug_assert!(self.state.accepts_messages());
                        let outcome = self.pipeline.handle(&message, &self.sink);
                        debug!(?outcome, "Message processed");
                    }
                    Err(e) => return SessionEnd::Lost(e),
                },
            }
        }
    }

    fn attempt_failed(&mut self, error: TransportError) {
        let auth = matches!(error, TransportError::AuthRejected(_));
        metrics().connection_failed(auth);
        warn!(kind = error.kind(), "Connection attempt failed: {}", error);
        self.apply(ConnectionEvent::AttemptFailed(error));
    }

    fn apply(&mut self, event: ConnectionEvent) -> Transition {
        let transition = next_state(self.state, &event);
        self.state = transition.to;

        let level = match event {
            ConnectionEvent::AttemptFailed(_) | ConnectionEvent::SessionLost(_) => LogLevel::Warn,
            _ => LogLevel::Info,
        };
        info!(
            from = %transition.from,
            to = %transition.to,
            "{}",
            transition.description
        );
        self.sink.on_log(LogLine::new(
            level,
            LogCategory::Connection,
            transition.description.clone(),
        ));
        if transition.changed() {
            self.sink.on_connection_state(transition.to);
        }
        transition
    }

    fn finish_shutdown(&mut self) {
        let transition = next_state(self.state, &ConnectionEvent::ShutdownRequested);
        self.state = transition.to;
        metrics().session_closed();

        if transition.is_session_loss() {
            self.pipeline.go_offline("Bridge stopped", &self.sink);
        }
        self.sink
            .on_log(LogLine::info(LogCategory::Connection, transition.description));
        // Always emitted, even when already disconnected
        self.sink.on_connection_state(ConnectionState::Disconnected);
        info!("Connection supervisor stopped");
    }
}

/// Connect and subscribe as one unit under the caller's timeout
async fn establish<C: Connector>(
    connector: &mut C,
    client_id: &str,
    topic: &str,
) -> Result<C::Session, TransportError> {
    let mut session = connector.connect(client_id).await?;
    session.subscribe(topic).await?;
    Ok(session)
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolve once shutdown is signalled; never resolves if the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Perform interruptible sleep with shutdown monitoring
/// Returns true if sleep completed, false if shutdown requested
async fn interruptible_sleep(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = wait_for_shutdown(shutdown) => {
            info!("Shutdown signal received during reconnection delay, stopping");
            false
        }
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Handle to a spawned supervisor
pub struct SupervisorHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<Result<(), ConfigurationError>>,
}

impl SupervisorHandle {
    /// A receiver that observes the same shutdown signal
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal shutdown and wait for the worker, aborting it after the grace period
    pub async fn shutdown(mut self) -> Result<(), BridgeError> {
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(SHUTDOWN_GRACE, &mut self.handle).await {
            Ok(Ok(result)) => result.map_err(BridgeError::from),
            Ok(Err(e)) if e.is_cancelled() => Ok(()),
            Ok(Err(e)) => Err(BridgeError::internal(format!("supervisor task failed: {e}"))),
            Err(_) => {
                warn!("Supervisor didn't shut down gracefully, forcing abort");
                self.handle.abort();
                Ok(())
            }
        }
    }

    /// Wait for the worker to stop on its own
    pub async fn join(self) -> Result<(), BridgeError> {
        match self.handle.await {
            Ok(result) => result.map_err(BridgeError::from),
            Err(e) => Err(BridgeError::internal(format!("supervisor task failed: {e}"))),
        }
    }
}
