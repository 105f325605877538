//! xarb spread arbitrage bot - entry point.
//!
//! Observation mode: quotes, sampling and decisions are logged only.
//! Paper mode: decisions execute against the simulated venue at live quotes.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use xarb_bot::{AppConfig, Application, OperatingMode};

/// Two-market spread arbitrage bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via XARB_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Execute decisions on the paper exchange regardless of the configured mode
    #[arg(long)]
    paper: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    xarb_telemetry::init_logging("info")?;

    info!("Starting xarb bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > XARB_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("XARB_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let mut config = AppConfig::from_file(&config_path)?;
    if args.paper {
        config.mode = OperatingMode::Paper;
    }
    info!(mode = config.mode.as_str(), info_url = %config.info_url, "Configuration loaded");

    let app = Application::new(config)?;
    app.run().await?;

    Ok(())
}
