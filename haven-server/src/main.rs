//! Haven Server - Main entry point.

use anyhow::{Context, Result};
use clap::Parser;
use haven_common::config::Config;
use haven_common::logging::init_logging;
use haven_common::Validate;
use std::path::PathBuf;

/// Haven - a supportive chat companion served over HTTP.
#[derive(Parser, Debug)]
#[command(name = "haven-server")]
#[command(version)]
#[command(about = "Serve the Haven chat UI and API.", long_about = None)]
struct Cli {
    /// Path to a JSON config file (default: ~/.haven/config.json)
    #[arg(short, long, env = "HAVEN_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_with_env(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate().context("Invalid configuration")?;

    init_logging(&config.observability.log_level, &config.observability.log_format);

    tracing::info!("Haven Server v{}", env!("CARGO_PKG_VERSION"));

    haven_server::start_server(&config).await
}
