//! Health and state HTTP server
//!
//! Serves the bridge's last known state to operators and orchestration
//! platforms. Everything comes from a [`SnapshotSink`], so the server never
//! touches the supervisor directly.
//!
//! - `GET /health` - 200 while the broker session is up, 503 otherwise
//! - `GET /state` - last display state, connection state and recent log lines
//! - `GET /metrics` - counters from the global metrics collector
//! - `GET /live` - liveness probe

use crate::observability::metrics::metrics;
use crate::sink::SnapshotSink;
use crate::supervisor::ConnectionState;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use warp::http::StatusCode;
use warp::Filter;

/// HTTP health check server
pub struct HealthServer {
    port: u16,
    snapshot: Arc<SnapshotSink>,
}

impl HealthServer {
    /// Create new health server
    pub fn new(port: u16, snapshot: Arc<SnapshotSink>) -> Self {
        Self { port, snapshot }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// All routes, separate from binding so they can be exercised in tests
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let health_snapshot = self.snapshot.clone();
        let state_snapshot = self.snapshot.clone();

        // GET /health - broker session status
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let snapshot = health_snapshot.clone();
                async move {
                    let status = health_status(&snapshot);
                    let code = if status.connection == ConnectionState::Connected {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&status), code))
                }
            });

        // GET /state - full last-known state
        let state_route = warp::path("state")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let snapshot = state_snapshot.clone();
                async move { Ok::<_, Infallible>(warp::reply::json(&snapshot.snapshot())) }
            });

        // GET /metrics - complete metrics export
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(|| async move {
                Ok::<_, Infallible>(warp::reply::json(&metrics().get_metrics()))
            });

        // GET /live - liveness probe
        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(|| async move {
                let response = LivenessResponse {
                    alive: true,
                    timestamp: current_timestamp(),
                };
                Ok::<_, Infallible>(warp::reply::json(&response))
            });

        health_route
            .or(state_route)
            .or(metrics_route)
            .or(live_route)
            .with(warp::cors().allow_any_origin())
    }

    /// Serve until `shutdown` flips to true
    pub async fn start(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let (bound, server) = warp::serve(self.routes()).try_bind_with_graceful_shutdown(
            addr,
            async move {
                while !*shutdown.borrow_and_update() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            },
        )?;

        tracing::info!("Starting health server on {}", bound);
        server.await;
        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn health_status(snapshot: &SnapshotSink) -> HealthStatus {
    let state = snapshot.snapshot();
    HealthStatus {
        status: if state.connection == ConnectionState::Connected {
            "healthy"
        } else {
            "unavailable"
        },
        connection: state.connection,
        display_label: state.display.label().to_string(),
        severity: state.display.severity().to_string(),
        alert_triggered: state.display.alert_triggered(),
        uptime_seconds: metrics().get_metrics().uptime_seconds,
        timestamp: current_timestamp(),
    }
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    connection: ConnectionState,
    display_label: String,
    severity: String,
    alert_triggered: bool,
    uptime_seconds: u64,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
