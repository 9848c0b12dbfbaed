use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::app_state::AppState;
use crate::audit::verify_audit_log;
use crate::config_loader::load_config;
use crate::input_validator::{CausalChainRequest, TrustEvaluationRequest};

/// Top-level CLI interface for the agent trust engine
#[derive(Parser)]
#[command(
    name = "agent_trust",
    version,
    about = "Causal chain analysis and trust scoring for autonomous agents"
)]
pub struct Cli {
    /// TOML config file (defaults to ./agent_trust.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Analyze a causal chain read from a file ("-" for stdin)
    Analyze {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Score an agent's activity log against a threat landscape
    Evaluate {
        #[arg(short, long)]
        agent: String,
        /// Activity log file ("-" for stdin)
        #[arg(long)]
        activity: PathBuf,
        /// Threat landscape description
        #[arg(long)]
        threat: String,
    },

    /// List registered agents
    Agents {
        /// Include archived agents
        #[arg(long)]
        all: bool,
    },

    /// Print the fleet summary tiles
    Summary,

    /// Check the hash links of an audit file
    VerifyAudit {
        #[arg(short, long)]
        path: PathBuf,
    },
}

fn read_input(path: &PathBuf) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    if let Commands::VerifyAudit { path } = &cli.command {
        let entries = verify_audit_log(path)?;
        println!("audit chain intact: {entries} entries");
        return Ok(());
    }

    let config = load_config(cli.config.as_deref()).context("failed to load config")?;
    let state = Arc::new(AppState::from_config(config)?);

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            let addr = format!("{host}:{port}");
            let socket_addr: std::net::SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid bind address {addr}"))?;

            let app = crate::trustweb::build_trust_router(Arc::clone(&state));
            let listener = tokio::net::TcpListener::bind(socket_addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            tracing::info!(%addr, "HTTP server listening");
            axum::serve(listener, app).await.context("server error")?;
        }
        Commands::Analyze { file } => {
            let req = CausalChainRequest {
                causal_chain_data: read_input(&file)?,
            };
            print_json(&state.service.analyze_causal_chain(req).await?)?;
        }
        Commands::Evaluate {
            agent,
            activity,
            threat,
        } => {
            let req = TrustEvaluationRequest {
                agent_id: agent,
                agent_activity_data: read_input(&activity)?,
                threat_landscape_description: threat,
            };
            print_json(&state.service.evaluate_trust(req).await?)?;
        }
        Commands::Agents { all } => {
            for agent in state.registry().list(all)? {
                println!(
                    "{:<12} {:<24} {:>5.2} {:<11} {}{}",
                    agent.id,
                    agent.name,
                    agent.trust_score,
                    agent.status.to_string(),
                    agent.runtime.containment,
                    if agent.archived { " (archived)" } else { "" }
                );
            }
        }
        Commands::Summary => print_json(&state.service.summary()?)?,
        Commands::VerifyAudit { .. } => {}
    }
    Ok(())
}
