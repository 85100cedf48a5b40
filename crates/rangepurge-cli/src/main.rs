//! # rangepurge-cli
//!
//! Command-line interface for Rangepurge.

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rangepurge_core::Config;

mod commands;
mod sink;

/// Rangepurge - purge a bounded range of chat messages
#[derive(Parser)]
#[command(name = "rangepurge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable color output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a purge against a simulated channel
    Simulate(SimulateArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of messages in the simulated channel
    #[arg(short, long, default_value = "250")]
    messages: usize,

    /// Seconds between consecutive messages
    #[arg(long, default_value = "60")]
    spacing_secs: i64,

    /// Position of the start message (0 is the oldest)
    #[arg(long, value_name = "POS")]
    start: usize,

    /// Position of the end message (0 is the oldest)
    #[arg(long, value_name = "POS")]
    end: usize,

    /// Messages fetched and deleted per batch
    #[arg(short, long)]
    limit: Option<u32>,

    /// Positions of messages to keep
    #[arg(long, value_name = "POS", value_delimiter = ',')]
    exclude: Vec<usize>,

    /// Positions of excluded messages to purge again
    #[arg(long, value_name = "POS", value_delimiter = ',')]
    include: Vec<usize>,

    /// Fail the Nth bulk delete call
    #[arg(long, value_name = "N")]
    fail_delete_at: Option<usize>,

    /// Fail the Nth page fetch
    #[arg(long, value_name = "N")]
    fail_fetch_at: Option<usize>,

    /// Print a JSON summary instead of progress
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for errors
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration before logging so its level applies
    let loaded = Config::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(config.logging.ansi && !cli.no_color).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = &loaded {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    match cli.command {
        Commands::Simulate(args) => {
            let config = config.into_validated()?;
            commands::simulate::run(args, &config).await?;
        }
        Commands::Config { action } => {
            commands::config::handle(action, &config)?;
        }
        Commands::Version => {
            println!("rangepurge {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
