//! # mdx-runner
//!
//! Main entry point for the market-data connector.
//!
//! Loads a JSON configuration file, builds the market directory, starts the
//! connector, and streams until interrupted.
//!
//! # Usage
//!
//! ```bash
//! mdx-runner config.json --log-level info
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use mdx_md::directory::MarketDirectory;
use tracing::info;

/// Market Data Connector Runner.
#[derive(Parser)]
#[command(name = "mdx-runner", about = "Market Data Connector Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output (overrides the config).
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = mdx_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path.clone());
    mdx_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name());

    info!(
        "mdx-runner starting — config={}, exchange={}, {} pair(s), {} channel(s)",
        cli.config.display(),
        config.exchange,
        config.pairs.len(),
        config.channels.len(),
    );

    // 3. Build the market directory
    let directory: Box<dyn MarketDirectory> = if config.offline_directory() {
        info!("using offline market directory (rule-derived symbols)");
        Box::new(mdx_md::bitfinex::offline_directory(config.market_kind, &config.pairs)?)
    } else {
        Box::new(mdx_md::bitfinex::rest::fetch_directory(&[config.market_kind]).await?)
    };

    // 4. Create and start the connector
    let sink = mdx_md::sink::debug_sink();
    let mut connector = mdx_md::create_connector(&config, directory.as_ref(), sink)?;
    connector.start().await?;
    info!("connector '{}' started — press Ctrl+C to stop", connector.name());

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 6. Stop gracefully
    connector.stop().await?;
    info!("connector stopped — goodbye");
    Ok(())
}
