//! Media Enrich CLI - content-addressed media enrichment runner
//!
//! Command-line interface for the step-based enrichment engine.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::cache::CacheCommand;
use commands::run::RunCommand;

#[derive(Parser)]
#[command(
    name = "media-enrich",
    version,
    about = "Run the enrichment chain over a media asset",
    long_about = "Runs the dependent analysis chain (diarization, entity extraction,\n\
                  entity disambiguation, scoring) over a media asset, caching every\n\
                  step result by content, config and step version.",
    after_help = "EXAMPLES:\n  \
                  # List registered steps\n  \
                  media-enrich steps\n\n  \
                  # Full run with a YAML config\n  \
                  media-enrich run episode.mp4 --config enrich.yaml\n\n  \
                  # Recompute everything, ignoring the cache\n  \
                  media-enrich run episode.mp4 --config enrich.yaml --force\n\n  \
                  # Resume after a fixed disambiguation knowledge base\n  \
                  media-enrich run episode.mp4 --config enrich.yaml --from-step entity-disambiguation\n\n  \
                  # Stop after extraction and inspect the cache\n  \
                  media-enrich run episode.mp4 --config enrich.yaml --until-step entity-extraction\n  \
                  media-enrich cache stats"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enrichment chain over one asset
    Run(RunCommand),

    /// Inspect or clear the step result cache
    Cache(CacheCommand),

    /// List registered steps with version, dependencies and policy
    Steps,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Steps listing stays clean; everything else logs at INFO by default
    let log_level = match &cli.command {
        Commands::Steps => Level::WARN,
        _ => {
            if cli.verbose {
                Level::DEBUG
            } else {
                Level::INFO
            }
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Run(cmd) => cmd.execute().await,
        Commands::Cache(cmd) => cmd.execute().await,
        Commands::Steps => commands::steps::list_steps(),
    }
}
