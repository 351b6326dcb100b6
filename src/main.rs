use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use encodeformastodon::{config::Config, pipeline::EncodeEngine};

#[derive(Parser)]
#[command(
    name = "encodeformastodon",
    version,
    about = "Encodes and resizes any input video in a format suitable for publishing to Mastodon.",
    long_about = "Centers the input video on a black 1920x1080 canvas and re-encodes it to <name>-Mastodon.mov next to the input file."
)]
struct Cli {
    /// Path to the video file that will be encoded
    path: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs share stderr with the progress line, so stay quiet unless asked
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting encodeformastodon v{}", env!("CARGO_PKG_VERSION"));

    let config = match cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(&config_path)
                .with_context(|| format!("failed to load {}", config_path.display()))?
        }
        None => {
            debug!("Using default configuration");
            Config::default()
        }
    };

    let engine = EncodeEngine::new(config);
    // The progress reporter ends its own line when an export fails
    let encoded = engine.encode(&cli.path).await.map_err(|e| {
        let message = e.user_message();
        anyhow::Error::new(e).context(message)
    })?;

    info!("Output saved to: {:?}", encoded.path);

    println!();
    println!("Done!");
    Ok(())
}
