use tracing::{debug, warn};

use crate::server::{
    files::{FileArea, OutgoingFile},
    registry::ClientRegistry,
};

/// Reply to `exit`.
pub const GOODBYE: &str = "Goodbye!";
/// Reply to `list` when the file area is empty.
pub const NO_FILES: &str = "No files found in server repository.";

/// Per-connection interpreter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Normal,
    /// Entered after `list`; the next line names a file.
    AwaitingFilename,
}

/// Commands recognized in the `Normal` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Status,
    List,
    Echo(String),
}

impl Command {
    /// Classifies a trimmed, non-empty line. Keywords are case-insensitive.
    pub fn parse(line: &str) -> Self {
        match line.to_ascii_lowercase().as_str() {
            "exit" => Command::Exit,
            "status" => Command::Status,
            "list" => Command::List,
            _ => Command::Echo(line.to_string()),
        }
    }
}

/// What the session should send back.
#[derive(Debug)]
pub enum Reply {
    /// A plain text reply.
    Text(String),
    /// A `FILE` header followed by the file's bytes.
    File(OutgoingFile),
    /// Send `Goodbye!` and end the session.
    Goodbye,
}

/// Decides replies and state transitions for one connection.
#[derive(Debug)]
pub struct CommandInterpreter {
    state: SessionState,
    registry: ClientRegistry,
    files: FileArea,
}

impl CommandInterpreter {
    pub fn new(registry: ClientRegistry, files: FileArea) -> Self {
        Self {
            state: SessionState::Normal,
            registry,
            files,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handles one received line.
    ///
    /// Blank lines produce no reply and leave the state alone. In
    /// `AwaitingFilename` every line is a filename, keywords included, and
    /// the state drops back to `Normal` whatever the outcome.
    pub async fn interpret(&mut self, line: &str) -> Option<Reply> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match self.state {
            SessionState::AwaitingFilename => {
                self.state = SessionState::Normal;
                Some(self.deliver(line).await)
            }
            SessionState::Normal => Some(self.dispatch(Command::parse(line)).await),
        }
    }

    async fn dispatch(&mut self, command: Command) -> Reply {
        debug!("Dispatching {:?}", command);
        match command {
            Command::Exit => Reply::Goodbye,
            Command::Status => Reply::Text(self.registry.render_status()),
            Command::List => self.list().await,
            Command::Echo(message) => Reply::Text(format!("{} ACK", message)),
        }
    }

    async fn list(&mut self) -> Reply {
        match self.files.list().await {
            Ok(names) => {
                self.state = SessionState::AwaitingFilename;
                if names.is_empty() {
                    Reply::Text(NO_FILES.to_string())
                } else {
                    Reply::Text(names.join("\n"))
                }
            }
            Err(e) => {
                warn!("Listing {} failed: {}", self.files.root().display(), e);
                Reply::Text(format!("Error listing files: {}", e))
            }
        }
    }

    async fn deliver(&self, requested: &str) -> Reply {
        match self.files.open(requested).await {
            Ok(Some(file)) => Reply::File(file),
            Ok(None) => Reply::Text(format!("File '{}' does not exist on the server.", requested)),
            Err(e) => {
                warn!("Opening '{}' failed: {}", requested, e);
                Reply::Text(format!("Error sending file: {}", e))
            }
        }
    }
}
