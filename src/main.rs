// Agent trust engine - main.rs
// Initializes tracing and hands off to the CLI dispatcher

use agent_trust::cli::{dispatch, Cli};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    dispatch(Cli::parse()).await
}
