//! Peg stabilization agent - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Peg stabilization agent
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PEG_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Plan trades without signing or broadcasting
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any WS connection
    peg_ws::init_crypto();

    let args = Args::parse();

    peg_telemetry::init_logging()?;

    info!("Starting peg-bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > PEG_CONFIG > default
    let config_path = args
        .config
        .or_else(|| std::env::var("PEG_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let mut config = peg_bot::AppConfig::from_file(&config_path)?;
    if args.dry_run {
        config.trading.dry_run = true;
    }
    info!(
        contract = %config.contract.address,
        feed = %config.feed.url,
        dry_run = config.trading.dry_run,
        "Configuration loaded"
    );

    let app = peg_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
