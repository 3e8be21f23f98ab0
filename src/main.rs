//! # Line Protocol Server
//!
//! Serves a line-oriented TCP protocol: echo, `status`, `list`, file
//! download after `list`, and `exit`.
//!
//! ## Features
//! - One task per connection, gated by a maximum number of active sessions
//! - Shared client registry reporting every connection ever admitted
//! - Length-announced file payloads on the same stream as text replies
//! - Environment-based configuration loading (`LP_*`, optional `.env`)
//! - Optional Prometheus metrics endpoint
//!
//! ## Dependencies
//! - `tokio` for asynchronous runtime
//! - `config` and `dotenv` for environment configuration
//! - `tracing` for logging

use lineproto_rs::{config, server};
use tracing_subscriber::EnvFilter;

/// Entry point for the server.
///
/// Initializes logging, loads configuration from the environment,
/// and runs the accept loop until Ctrl-C.
///
/// # Errors
/// Returns an error if configuration validation fails or if the server fails to bind.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::ServerConfig::from_env()?;
    server::run(config).await?;

    Ok(())
}
