use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tabcast_worker::{Config, McpController};

#[derive(Parser, Debug)]
#[clap(
    name = "tabcast-worker",
    version,
    about = "Tabcast worker hub - hosts the MCP server and dials the remote proxy"
)]
struct Args {
    /// Path to configuration file
    #[clap(short, long, default_value = "tabcast.toml")]
    config: PathBuf,

    /// Proxy WebSocket URL (overrides the config file)
    #[clap(short, long)]
    url: Option<String>,

    /// Auth token presented to the proxy
    #[clap(short, long)]
    token: Option<String>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("starting tabcast-worker v{}", env!("CARGO_PKG_VERSION"));

    let mut config = if args.config.exists() {
        Config::from_file(&args.config)?
    } else {
        Config::default()
    };
    if let Some(url) = args.url {
        config.worker.link.url = url;
    }
    let token = args.token.or(config.auth_token.take());

    let controller = McpController::new(config.worker.clone());
    controller.connect_link(token)?;

    info!(url = %config.worker.link.url, "link loop started");
    info!("built-in tools:");
    info!("  - list_browser_tabs: tab discovery for call targeting");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
