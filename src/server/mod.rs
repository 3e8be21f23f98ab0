// src/server/mod.rs
pub mod admission;
pub mod command;
pub mod files;
pub mod handler;
pub mod health;
pub mod registry;

// Re-export public components
pub use admission::{accept_connections, Admission};
pub use command::{CommandInterpreter, Reply, SessionState};
pub use files::FileArea;
pub use handler::handle_connection;
pub use health::HealthMetrics;
pub use registry::{ClientRecord, ClientRegistry};

use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{info, error};

use crate::config::ServerConfig;
use crate::utils::ProtocolError;

/// State shared by the accept loop and every session.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    pub registry: ClientRegistry,
    pub files: FileArea,
    pub metrics: HealthMetrics,
}

impl ServerState {
    /// Builds fresh state: an empty registry and the configured file area.
    pub fn new(config: ServerConfig) -> Result<Self, ProtocolError> {
        let files = FileArea::new(config.file_dir.clone());
        Ok(Self {
            config: Arc::new(config),
            registry: ClientRegistry::new(),
            files,
            metrics: HealthMetrics::new()?,
        })
    }
}

/// Prepares the file area and binds the configured endpoint.
pub async fn bind(state: &ServerState) -> Result<TcpListener, ProtocolError> {
    state.files.prepare().await?;
    let listener = TcpListener::bind(state.config.bind_address()).await?;
    info!("Server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Runs the server until Ctrl-C.
pub async fn run(config: ServerConfig) -> Result<(), ProtocolError> {
    config.validate()?;
    let state = Arc::new(ServerState::new(config)?);
    let listener = bind(&state).await?;

    if let Some(port) = state.config.metrics_port {
        let metrics_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve_metrics_http(metrics_state, port).await {
                error!("Metrics server stopped: {}", e);
            }
        });
    }

    tokio::select! {
        _ = accept_connections(listener, state.clone()) => {},
        res = signal::ctrl_c() => {
            res?;
            info!(
                "Shutting down gracefully ({} clients seen, {} active)",
                state.registry.len(),
                state.registry.count_active()
            );
        }
    }

    Ok(())
}
