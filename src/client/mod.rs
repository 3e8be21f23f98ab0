//! Interactive client for the line protocol.

pub mod prompt;
pub mod session;

pub use prompt::PromptHandle;
pub use session::{run_client, run_many, ClientOutcome, FileReply};

use clap::Parser;
use std::path::PathBuf;

use crate::config::{DEFAULT_HOST, DEFAULT_PORT};

/// Command-line options for the client binary.
#[derive(Clone, Debug, Parser)]
#[command(name = "lineproto-client", about = "Line protocol TCP client")]
pub struct ClientArgs {
    /// Server host
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Spawn N interactive sessions against the same server
    #[arg(long, default_value_t = 1)]
    pub clients: usize,

    /// Where downloaded files are written
    #[arg(long, default_value = ".")]
    pub download_dir: PathBuf,
}

/// Connection settings shared by every session of one client process.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub download_dir: PathBuf,
}

impl From<&ClientArgs> for ClientOptions {
    fn from(args: &ClientArgs) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            download_dir: args.download_dir.clone(),
        }
    }
}
