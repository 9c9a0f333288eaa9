//! Marquee CLI - Headless Playback Client
//!
//! Features:
//! - Capability negotiation against a live server
//! - Simulated playback with real session reporting
//! - Skip segment and trickplay inspection
//! - Device profile dump

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use url::Url;

mod commands;
mod headless;
mod output;

/// Marquee CLI - Adaptive playback engine client
#[derive(Parser)]
#[command(name = "marquee")]
#[command(author = "Marquee Contributors")]
#[command(version)]
#[command(about = "Headless client for the Marquee playback engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "table")]
    format: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server base URL
    #[arg(long, env = "MARQUEE_SERVER_URL")]
    server: Option<Url>,

    /// Access token
    #[arg(long, env = "MARQUEE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Signed-in user id
    #[arg(long, env = "MARQUEE_USER_ID")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Negotiate playback for an item and show the outcome
    Negotiate {
        /// Item id
        item: String,

        /// Start position in seconds
        #[arg(short, long)]
        start: Option<f64>,

        /// Force a playback method (directplay, directstream, transcode)
        #[arg(short, long)]
        method: Option<String>,

        /// Audio stream index
        #[arg(long)]
        audio: Option<i32>,

        /// Subtitle stream index (-1 for none)
        #[arg(long, allow_hyphen_values = true)]
        subtitle: Option<i32>,
    },

    /// Play an item through the engine with a simulated sink
    Play {
        /// Item id
        item: String,

        /// Seconds to play before stopping (0 = until Ctrl-C)
        #[arg(short, long, default_value = "30")]
        duration: u64,

        /// Start position in seconds
        #[arg(short, long)]
        start: Option<f64>,

        /// Force a playback method (directplay, directstream, transcode)
        #[arg(short, long)]
        method: Option<String>,

        /// Simulate a sink that opens but never advances
        #[arg(long)]
        stall: bool,
    },

    /// List skip segments for an item
    Segments {
        /// Item id
        item: String,
    },

    /// Compute a trickplay preview
    Trickplay {
        /// Item id
        item: String,

        /// Position in seconds
        #[arg(short, long, default_value = "0")]
        at: f64,

        /// Media source id (defaults to the item id)
        #[arg(long)]
        source: Option<String>,

        /// Save the sprite sheet to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the device capability profile
    Profile,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    marquee_core::init();

    let overrides = commands::Overrides {
        server: cli.server,
        token: cli.token,
        user: cli.user,
    };

    match cli.command {
        Commands::Negotiate { item, start, method, audio, subtitle } => {
            let config = commands::load_config(cli.config.as_deref(), &overrides)?;
            commands::negotiate(config, &item, start, method, audio, subtitle, &cli.format).await?;
        }
        Commands::Play { item, duration, start, method, stall } => {
            let config = commands::load_config(cli.config.as_deref(), &overrides)?;
            commands::play(config, &item, duration, start, method, stall, &cli.format).await?;
        }
        Commands::Segments { item } => {
            let config = commands::load_config(cli.config.as_deref(), &overrides)?;
            commands::segments(config, &item, &cli.format).await?;
        }
        Commands::Trickplay { item, at, source, output } => {
            let config = commands::load_config(cli.config.as_deref(), &overrides)?;
            commands::trickplay(config, &item, at, source, output, &cli.format).await?;
        }
        Commands::Profile => {
            commands::profile()?;
        }
    }

    Ok(())
}
