use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use lineproto_rs::client::{self, ClientArgs, ClientOptions, PromptHandle};

#[tokio::main]
async fn main() -> Result<()> {
    // Keep diagnostics off the prompt unless asked for.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = ClientArgs::parse();
    if !args.download_dir.is_dir() {
        anyhow::bail!("Download directory does not exist: {}", args.download_dir.display());
    }
    let opts = ClientOptions::from(&args);
    let prompt = PromptHandle::interactive();

    if args.clients <= 1 {
        client::run_client(&opts, prompt, "")
            .await
            .context("client session failed")?;
    } else {
        for (i, outcome) in client::run_many(&opts, args.clients, prompt).await.into_iter().enumerate() {
            if let Err(e) = outcome {
                error!("Client {} failed: {:#}", i + 1, e);
            }
        }
    }

    Ok(())
}
