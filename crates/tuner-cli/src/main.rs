//! Tuner CLI - Playback engine diagnostics
//!
//! Features:
//! - Stream type detection and engine recommendation
//! - Backoff schedule inspection
//! - Simulated playback sessions with injected native faults

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tuner_core::TunerConfig;

mod commands;
mod output;

use commands::{Fault, SimulateArgs};

/// Tuner CLI - Playback engine toolkit
#[derive(Parser)]
#[command(name = "tuner-cli")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Playback engine diagnostics for live IPTV streams", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the stream type of a URL and the engine that would play it
    Detect {
        /// Stream URL
        url: String,
    },

    /// Show the retry delay schedule
    Backoff {
        /// Override max attempts
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Override the first delay in milliseconds
        #[arg(long)]
        initial_delay_ms: Option<u64>,

        /// Override the delay cap in milliseconds
        #[arg(long)]
        max_delay_ms: Option<u64>,

        /// Override the backoff multiplier
        #[arg(long)]
        multiplier: Option<f64>,
    },

    /// Open a stream on the simulated runtime
    Simulate {
        /// Stream URL
        url: String,

        /// Platform family (general, embedded)
        #[arg(short, long)]
        platform: Option<String>,

        /// Preferred engine (adaptive, segment_only, progressive, embedded)
        #[arg(short, long)]
        engine: Option<String>,

        /// Native fault to inject
        #[arg(long, value_enum, default_value = "none")]
        fault: Fault,

        /// Number of consecutive library/player loads that fail
        #[arg(long, default_value = "1")]
        repeat: usize,

        /// Record backoff delays instead of waiting them out
        #[arg(long)]
        no_wait: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .init();

    tuner_core::init();

    let config = match &cli.config {
        Some(path) => TunerConfig::from_file(path)?,
        None => TunerConfig::default(),
    };

    match cli.command {
        Commands::Detect { url } => {
            commands::detect(&url, &cli.format)?;
        }
        Commands::Backoff { max_attempts, initial_delay_ms, max_delay_ms, multiplier } => {
            let mut recovery = config.recovery.clone();
            if let Some(value) = max_attempts {
                recovery.max_attempts = value;
            }
            if let Some(value) = initial_delay_ms {
                recovery.initial_delay_ms = value;
            }
            if let Some(value) = max_delay_ms {
                recovery.max_delay_ms = value;
            }
            if let Some(value) = multiplier {
                recovery.backoff_multiplier = value;
            }
            commands::backoff(&recovery, &cli.format)?;
        }
        Commands::Simulate { url, platform, engine, fault, repeat, no_wait } => {
            let args = SimulateArgs {
                url,
                platform: platform.as_deref().map(str::parse).transpose()?,
                engine: engine.as_deref().map(str::parse).transpose()?,
                fault,
                repeat,
                no_wait,
            };
            commands::simulate(&config, args, &cli.format).await?;
        }
    }

    Ok(())
}
