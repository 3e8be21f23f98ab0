use std::{net::SocketAddr, sync::Arc};
use chrono::Local;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    codec::{FrameReader, FrameWriter},
    server::{
        command::{CommandInterpreter, Reply, GOODBYE},
        ServerState,
    },
    utils::error::ProtocolError,
};

/// How a session loop ended, when it ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent `exit`.
    Exit,
    /// The client closed the stream.
    PeerClosed,
}

/// Runs one admitted connection to completion.
///
/// The client is already registered under `name`. Whatever way the session
/// ends, its registry record is stamped disconnected before returning.
#[instrument(skip(stream, state), fields(client = %name))]
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    name: String,
    state: Arc<ServerState>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    state.metrics.active_sessions.inc();
    let result = run_session(&mut reader, &mut writer, &name, &state).await;

    match &result {
        Ok(end) => info!("Session closed ({:?})", end),
        Err(e) if e.is_transport() => info!("Connection lost: {}", e),
        // The stream is still line-aligned, so the client can be told why.
        Err(e @ ProtocolError::LineTooLong(_)) => {
            error!("Session failed: {}", e);
            if let Err(send_err) = writer.write_text(&format!("Error: {}", e)).await {
                debug!("Could not report error to {}: {}", addr, send_err);
            }
        }
        Err(e) => error!("Session failed: {}", e),
    }

    state.registry.mark_disconnected(&name, Local::now());
    state.metrics.active_sessions.dec();

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of {} failed: {}", addr, e);
    }
}

/// Welcome, then the read/dispatch/reply loop.
///
/// Generic over the stream halves so it can be driven without a socket.
pub async fn run_session<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    name: &str,
    state: &ServerState,
) -> Result<SessionEnd, ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_text(&format!("Welcome {}!", name)).await?;

    let mut interpreter = CommandInterpreter::new(state.registry.clone(), state.files.clone());

    while let Some(line) = reader.read_complete_text_line().await? {
        state.metrics.commands_received.inc();
        debug!("Received {:?}", line);

        let Some(reply) = interpreter.interpret(&line).await else {
            continue;
        };

        match reply {
            Reply::Text(text) => writer.write_text(&text).await?,
            Reply::Goodbye => {
                writer.write_text(GOODBYE).await?;
                state.metrics.replies_sent.inc();
                return Ok(SessionEnd::Exit);
            }
            Reply::File(mut outgoing) => {
                info!("Sending {}", outgoing.header);
                let sent = writer
                    .write_file(&outgoing.header, &mut outgoing.file)
                    .await
                    .map_err(|e| {
                        warn!("Delivery of {} aborted: {}", outgoing.header.name, e);
                        e
                    })?;
                state.metrics.files_sent.inc();
                state.metrics.bytes_sent.inc_by(sent);
            }
        }
        state.metrics.replies_sent.inc();
    }

    Ok(SessionEnd::PeerClosed)
}
