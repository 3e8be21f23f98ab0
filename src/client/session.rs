use std::io;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

use crate::client::{prompt::PromptHandle, ClientOptions};
use crate::codec::{FileHeader, FrameReader, FrameWriter};
use crate::server::{admission::SERVER_FULL, files::FileArea};
use crate::utils::ProtocolError;

/// How an interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOutcome {
    /// Nothing was listening.
    Refused,
    /// The server was at capacity.
    Rejected,
    /// `exit` was acknowledged.
    Exited,
    /// The server closed the connection.
    Disconnected,
    /// The user closed the input.
    InputClosed,
}

/// Result of one filename request made after `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileReply {
    /// The file was saved here.
    Saved { path: PathBuf, bytes: u64 },
    /// The server answered with text instead.
    Text(String),
    /// The connection closed before any reply.
    Closed,
}

/// Connects and runs one REPL session to completion.
#[instrument(skip(opts, prompt), fields(host = %opts.host, port = opts.port))]
pub async fn run_client(opts: &ClientOptions, prompt: PromptHandle, label: &str) -> Result<ClientOutcome> {
    let stream = match TcpStream::connect((opts.host.as_str(), opts.port)).await {
        Ok(stream) => stream,
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            println!("{}[error] Connection refused. Is the server running?", label);
            return Ok(ClientOutcome::Refused);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("connect {}:{}", opts.host, opts.port));
        }
    };

    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    match reader.read_chunk().await? {
        Some(welcome) => {
            let welcome = String::from_utf8_lossy(&welcome);
            println!("{}{}", label, welcome.trim_end());
            if welcome.starts_with(SERVER_FULL) {
                return Ok(ClientOutcome::Rejected);
            }
        }
        None => {
            println!("{}[error] Server closed the connection.", label);
            return Ok(ClientOutcome::Disconnected);
        }
    }

    repl(&mut reader, &mut writer, &prompt, &opts.download_dir, label).await
}

/// Prompt, send, print until `exit`, end of input or disconnect.
///
/// Mirrors the server's state: the line after a successful `list` is always a
/// filename request, even if it spells a keyword.
pub async fn repl<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    prompt: &PromptHandle,
    download_dir: &Path,
    label: &str,
) -> Result<ClientOutcome>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let prompt_text = format!("{}> ", label);
    let mut awaiting_filename = false;

    loop {
        let Some(input) = prompt.read_line(&prompt_text).await else {
            println!("{}[info] Exiting client.", label);
            return Ok(ClientOutcome::InputClosed);
        };
        let msg = input.trim();
        if msg.is_empty() {
            continue;
        }

        if let Err(e) = writer.write_raw(format!("{}\n", msg).as_bytes()).await {
            debug!("Send failed: {}", e);
            println!("{}[error] Server closed the connection.", label);
            return Ok(ClientOutcome::Disconnected);
        }

        if awaiting_filename {
            awaiting_filename = false;
            match receive_file(reader, msg, download_dir, label).await? {
                FileReply::Saved { path, bytes } => {
                    println!("{}[downloaded] {} ({} bytes)", label, path.display(), bytes);
                }
                FileReply::Text(text) => println!("{}{}", label, text),
                FileReply::Closed => {
                    println!("{}[error] Connection closed while waiting for response.", label);
                    return Ok(ClientOutcome::Disconnected);
                }
            }
            continue;
        }

        let Some(reply) = reader.read_chunk().await? else {
            println!("{}[error] Server closed the connection.", label);
            return Ok(ClientOutcome::Disconnected);
        };
        let reply = String::from_utf8_lossy(&reply);
        let reply = reply.trim_end();
        if !reply.is_empty() {
            println!("{}{}", label, reply);
        }

        match msg.to_ascii_lowercase().as_str() {
            "exit" => {
                println!("{}[info] Disconnected.", label);
                return Ok(ClientOutcome::Exited);
            }
            "list" => awaiting_filename = !reply.starts_with("Error listing files"),
            _ => {}
        }
    }
}

/// Reads the answer to a filename request: a `FILE` header plus payload, or text.
///
/// The payload streams straight to `download_dir`. A short payload removes the
/// partial file and fails.
pub async fn receive_file<R>(
    reader: &mut FrameReader<R>,
    requested: &str,
    download_dir: &Path,
    label: &str,
) -> Result<FileReply>
where
    R: AsyncRead + Unpin,
{
    let Some(line) = reader.read_text_line().await? else {
        return Ok(FileReply::Closed);
    };

    let header = match FileHeader::parse(&line) {
        Ok(header) => header,
        Err(_) => return Ok(FileReply::Text(line.trim_end().to_string())),
    };
    println!("{}[info] Receiving file: {}", label, header);

    let name = FileArea::sanitize(&header.name)
        .or_else(|| FileArea::sanitize(requested))
        .ok_or_else(|| ProtocolError::InvalidHeader(line.clone()))?;
    let path = download_dir.join(name);

    let mut file = File::create(&path)
        .await
        .with_context(|| format!("create {}", path.display()))?;
    match reader.copy_exact(header.size, &mut file).await {
        Ok(bytes) => Ok(FileReply::Saved { path, bytes }),
        Err(e) => {
            drop(file);
            if let Err(rm) = fs::remove_file(&path).await {
                warn!("Could not remove partial {}: {}", path.display(), rm);
            }
            Err(e).with_context(|| format!("download of {}", header.name))
        }
    }
}

/// Runs `count` sessions side by side and waits for all of them.
pub async fn run_many(opts: &ClientOptions, count: usize, prompt: PromptHandle) -> Vec<Result<ClientOutcome>> {
    let mut handles = Vec::with_capacity(count);
    for i in 1..=count {
        let opts = opts.clone();
        let prompt = prompt.clone();
        handles.push(tokio::spawn(async move {
            let label = format!("[client {}] ", i);
            run_client(&opts, prompt, &label).await
        }));
    }

    let mut outcomes = Vec::with_capacity(count);
    for handle in handles {
        outcomes.push(match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(anyhow::anyhow!("client task failed: {}", e)),
        });
    }
    outcomes
}
