use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tnc_tracker::config::{AppConfig, DEFAULT_CONFIG_PATH};
use tnc_tracker::log_format::CompactFormat;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "tnc-tracker",
    version,
    about = "Track APRS stations heard by a KISS TNC and relay them live"
)]
struct Cli {
    /// TOML configuration file; defaults are used when it does not exist
    #[arg(long, global = true, env = "TNC_TRACKER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to the TNC, ingest packets and serve the REST/WebSocket API
    Run,
    /// Delete packet history older than the retention period and exit
    PruneHistory {
        /// Override history.retention_days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Decode a hex-encoded frame and print the parsed packet
    Decode {
        /// Hex bytes; whitespace and colons are ignored
        hex: String,
        /// Input is a KISS byte stream rather than a bare AX.25 frame
        #[arg(long, default_value_t = false)]
        kiss: bool,
    },
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level {:?}", level))?,
    };
    let ansi = std::io::stderr().is_terminal();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .event_format(CompactFormat::new(ansi))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_file_and_env(&cli.config)?;
    init_tracing(&config.log.level)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run => commands::handle_run(config).await,
        Commands::PruneHistory { days } => commands::handle_prune_history(config, days).await,
        Commands::Decode { hex, kiss } => commands::handle_decode(&hex, kiss),
    }
}
