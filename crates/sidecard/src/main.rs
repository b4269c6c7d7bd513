//! sidecard - heartbeat bridge between a game server process and its
//! GameServer resource.

use anyhow::{Context, Result};
use clap::Parser;
use sidecard::cluster::KubeClusterClient;
use sidecard::config::{GameServerIdentity, SidecarConfig};
use sidecard::server::{self, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sidecard", version, about)]
struct Args {
    /// Path to the TOML config file
    #[arg(long)]
    config: Option<String>,

    /// Listen address, overrides the config file
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SidecarConfig::load_from_path(path)
            .with_context(|| format!("loading config {}", path))?,
        None => SidecarConfig::load(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let identity = GameServerIdentity::from_env()?;
    info!(
        "sidecard v{} starting for GameServer {}/{}",
        env!("CARGO_PKG_VERSION"),
        identity.namespace,
        identity.name
    );

    let client = KubeClusterClient::from_config(&config, &identity)
        .context("initializing cluster client")?;
    let state = AppState::new(&config, identity, Arc::new(client))?;

    server::run(state, &config.listen_addr).await
}
