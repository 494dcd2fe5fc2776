//! Cuepoint CLI - Headless Session Replayer
//!
//! Features:
//! - Replay recorded engine event traces against a simulated engine
//! - Watch-time and seek accounting reports
//! - Marker list validation

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use url::Url;

mod commands;
mod output;

/// Cuepoint CLI - Interactive playback toolkit
#[derive(Parser)]
#[command(name = "cuepoint-cli")]
#[command(author = "Cuepoint Contributors")]
#[command(version)]
#[command(about = "Replay and inspect interactive playback sessions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an engine event trace through a session
    Replay {
        /// Trace file (JSON)
        #[arg(short, long)]
        trace: PathBuf,

        /// Session configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Question sets keyed by marker identifier (JSON)
        #[arg(short, long, conflicts_with = "question_url")]
        questions: Option<PathBuf>,

        /// Base URL of a question service
        #[arg(long)]
        question_url: Option<Url>,

        /// Endpoint receiving heartbeats (logged when omitted)
        #[arg(long)]
        beacon_url: Option<Url>,

        /// Media duration in seconds
        #[arg(short, long, default_value = "600")]
        duration: f64,

        /// Reject play requests until the trace issues a command
        #[arg(long)]
        block_autoplay: bool,

        /// Score recorded for each auto-answered question
        #[arg(long, default_value = "1")]
        score: f64,
    },

    /// Validate a marker list
    CheckMarkers {
        /// Marker list or viewer state file (JSON)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt().with_env_filter(level);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    cuepoint_core::init();

    match cli.command {
        Commands::Replay {
            trace,
            config,
            questions,
            question_url,
            beacon_url,
            duration,
            block_autoplay,
            score,
        } => {
            let options = commands::ReplayOptions {
                trace,
                config,
                questions,
                question_url,
                beacon_url,
                duration,
                block_autoplay,
                score,
            };
            commands::replay(options, &cli.format).await?;
        }
        Commands::CheckMarkers { file } => {
            commands::check_markers(&file, &cli.format)?;
        }
    }

    Ok(())
}
