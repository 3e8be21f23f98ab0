use std::{net::SocketAddr, sync::Arc};
use chrono::Local;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::{
    codec::FrameWriter,
    server::{handler, ServerState},
};

/// Reply sent to a connection refused at capacity.
pub const SERVER_FULL: &str = "Server full, try again later.";

/// Outcome of the capacity check for one accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Registered under this name.
    Admitted(String),
    /// Turned away; nothing was registered.
    Full,
}

/// Checks capacity and registers the connection if there is room.
pub fn admit(state: &ServerState, addr: SocketAddr) -> Admission {
    match state.registry.admit(addr, Local::now(), state.config.max_clients) {
        Some(name) => Admission::Admitted(name),
        None => Admission::Full,
    }
}

/// Accepts connections forever, gating each one before starting its session.
///
/// This is the only serial point of the server; each admitted session runs
/// on its own task.
pub async fn accept_connections(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => dispatch(stream, addr, &state),
            Err(e) => error!("Accept error: {}", e),
        }
    }
}

fn dispatch(stream: TcpStream, addr: SocketAddr, state: &Arc<ServerState>) {
    match admit(state, addr) {
        Admission::Admitted(name) => {
            info!("Accepted {} as {}", addr, name);
            tokio::spawn(handler::handle_connection(stream, addr, name, state.clone()));
        }
        Admission::Full => {
            warn!("Rejecting {}: {} sessions active", addr, state.config.max_clients);
            state.metrics.rejected_connections.inc();
            tokio::spawn(reject(stream, addr));
        }
    }
}

/// Sends the capacity notice and closes.
async fn reject(stream: TcpStream, addr: SocketAddr) {
    let mut writer = FrameWriter::new(stream);
    if let Err(e) = writer.write_text(SERVER_FULL).await {
        debug!("Could not notify {}: {}", addr, e);
    }
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of {} failed: {}", addr, e);
    }
}
