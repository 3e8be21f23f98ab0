use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use axum::{Router, routing::get, extract::State, response::IntoResponse};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

use crate::server::ServerState;
use crate::utils::ProtocolError;

/// Struct for managing server health metrics: live sessions and traffic counts.
#[derive(Clone)]
pub struct HealthMetrics {
    /// Tracks the number of running sessions.
    pub active_sessions: IntGauge,
    /// Counts command lines received across all sessions.
    pub commands_received: IntCounter,
    /// Counts text replies and file deliveries sent.
    pub replies_sent: IntCounter,
    /// Counts completed file deliveries.
    pub files_sent: IntCounter,
    /// Counts payload bytes streamed to clients.
    pub bytes_sent: IntCounter,
    /// Counts connections turned away because the server was full.
    pub rejected_connections: IntCounter,
    /// Prometheus registry used to store and manage the metrics.
    registry: Registry,
}

impl HealthMetrics {
    /// Creates a new instance of `HealthMetrics` and registers the metrics with Prometheus.
    ///
    /// # Errors
    /// Returns `ProtocolError::MetricsError` if a metric can't be created or registered.
    pub fn new() -> Result<Self, ProtocolError> {
        let registry = Registry::new();
        let active_sessions = IntGauge::new("active_sessions", "Running sessions")?;
        let commands_received = IntCounter::new("commands_received", "Total command lines received")?;
        let replies_sent = IntCounter::new("replies_sent", "Total replies sent")?;
        let files_sent = IntCounter::new("files_sent", "Total files delivered")?;
        let bytes_sent = IntCounter::new("bytes_sent", "Total payload bytes delivered")?;
        let rejected_connections =
            IntCounter::new("rejected_connections", "Connections refused at capacity")?;

        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(commands_received.clone()))?;
        registry.register(Box::new(replies_sent.clone()))?;
        registry.register(Box::new(files_sent.clone()))?;
        registry.register(Box::new(bytes_sent.clone()))?;
        registry.register(Box::new(rejected_connections.clone()))?;

        Ok(Self {
            active_sessions,
            commands_received,
            replies_sent,
            files_sent,
            bytes_sent,
            rejected_connections,
            registry,
        })
    }

    /// Exposes the current state of all registered metrics in Prometheus-compatible format.
    pub fn expose_metrics(&self) -> Result<String, ProtocolError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ProtocolError::MetricsError(e.to_string()))
    }
}

/// Serves `/metrics` over plain HTTP on the given port until the process exits.
///
/// # Errors
/// Returns `ProtocolError::MetricsError` if the HTTP server fails.
pub async fn serve_metrics_http(state: Arc<ServerState>, port: u16) -> Result<(), ProtocolError> {
    let addr: SocketAddr = tokio::net::lookup_host((state.config.host.as_str(), port))
        .await?
        .next()
        .ok_or_else(|| {
            ProtocolError::MetricsError(format!("no address for {}", state.config.host))
        })?;

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    info!("Metrics available on http://{}/metrics", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| ProtocolError::MetricsError(e.to_string()))
}

/// Handles the `/metrics` HTTP request and returns the current metrics data.
async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match state.metrics.expose_metrics() {
        Ok(body) => (axum::http::StatusCode::OK, body),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
