use std::io;
use thiserror::Error;

/// Represents the errors that can end or disturb a protocol session.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Represents an underlying I/O failure on the socket or the file area.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the stream while a message was only partially received.
    ///
    /// Raised by exact-byte reads; the message is never retried.
    #[error("Connection closed: expected {expected} bytes, received {received}")]
    ConnectionClosed { expected: u64, received: u64 },

    /// A line was handed to the header parser that is not a valid `FILE` header.
    #[error("Invalid file header: {0}")]
    InvalidHeader(String),

    /// A line grew past the allowed length without a terminator.
    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),

    /// A file yielded fewer bytes than its header announced.
    ///
    /// The receiver has already been told the size, so the stream can't be repaired.
    #[error("Short payload for '{name}': announced {expected} bytes, sent {sent}")]
    ShortPayload { name: String, expected: u64, sent: u64 },

    /// A client name was registered twice.
    #[error("Client {0} is already registered")]
    DuplicateClient(String),

    /// Represents an error in the server configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Indicates a failure while setting up or serving metrics.
    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl ProtocolError {
    /// Returns `true` for failures caused by the peer going away.
    ///
    /// These end the session quietly; everything else is a fault worth reporting.
    pub fn is_transport(&self) -> bool {
        match self {
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            ProtocolError::ConnectionClosed { .. } => true,
            _ => false,
        }
    }
}

impl From<prometheus::Error> for ProtocolError {
    fn from(err: prometheus::Error) -> Self {
        ProtocolError::MetricsError(err.to_string())
    }
}
