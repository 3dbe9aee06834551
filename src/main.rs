//! Rover CLI
//!
//! Command-line interface for the local time-series archive:
//! - Retrieve missing data from a remote service
//! - List what the index holds
//! - Dry-run a retrieval
//! - Generate a config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use rover::config::{generate_default_config, write_default_config, Config, LoggingConfig};
use rover::query::{parse_list_index_args, parse_retrieve_args};
use rover::retrieval::HttpTransport;
use rover::Rover;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rover")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Retrieve time-series data into a local day-partitioned archive")]
#[command(long_about = "Rover keeps a local archive of time-series data in sync with a remote service.\nIt only fetches what the index does not already hold.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: <config dir>/rover/config.toml, then ./rover.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and archive data missing from the index
    Retrieve {
        /// N_S_L_C or key=value filters, then start and end times
        #[arg(required = true)]
        args: Vec<String>,
    },

    /// List archived streams and their partitions
    ListIndex {
        /// N_S_L_C or key=value filters, then optionally `partitions` or `coverage`
        args: Vec<String>,
    },

    /// Show what `retrieve` would fetch, without touching the network
    ListRetrieve {
        /// N_S_L_C or key=value filters, then start and end times
        #[arg(required = true)]
        args: Vec<String>,
    },

    /// Generate default config file
    WriteConfig {
        /// Output path (default: stdout); an existing file is kept as FILE~
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::WriteConfig { output } = &cli.command {
        return write_config(output.as_ref());
    }

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate()?;
    init_logging(&config.logging)?;

    tracing::debug!("Rover v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Retrieve { args } => {
            let request = parse_retrieve_args(&args)?;
            let rover = Rover::open(config)?;
            let transport = Arc::new(HttpTransport::new(rover.config().retrieval.http_config())?);

            let mut interrupted = false;
            tokio::select! {
                result = rover.retrieve(&request.pattern, request.interval, transport) => {
                    let summary = result?;
                    eprint!("{}", summary.render());
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("Interrupted; partitions committed so far are kept");
                    interrupted = true;
                }
            }

            rover.close()?;
            if interrupted {
                std::process::exit(130);
            }
        }

        Commands::ListIndex { args } => {
            let request = parse_list_index_args(&args)?;
            let rover = Rover::open(config)?;
            print!("{}", rover.list_index(&request.pattern, request.format)?);
            rover.close()?;
        }

        Commands::ListRetrieve { args } => {
            let request = parse_retrieve_args(&args)?;
            let rover = Rover::open(config)?;
            print!("{}", rover.list_retrieve(&request.pattern, request.interval)?);
            rover.close()?;
        }

        Commands::WriteConfig { .. } => {}
    }

    Ok(())
}

fn write_config(output: Option<&PathBuf>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            let backup = write_default_config(path)?;
            if let Some(backup) = backup {
                eprintln!("Moved existing config to {}", backup.display());
            }
            eprintln!("Wrote default config to {}", path.display());
        }
        None => print!("{}", generate_default_config()),
    }
    Ok(())
}

/// Build the subscriber: stderr (pretty or JSON) plus an optional log file
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rover={}", config.level)));

    let (pretty, json) = if config.format == "json" {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    let file = match &config.file {
        Some(path) => {
            let path = rover::config::expand_path(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .with(file)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}
