//! Cache inspection and maintenance commands

use anyhow::Result;
use clap::{Args, Subcommand};
use enrich_core::FsCacheStore;
use std::path::PathBuf;

#[derive(Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    action: CacheAction,

    /// Step result cache directory
    #[arg(long, global = true, default_value = "cache")]
    cache_dir: PathBuf,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Per-step entry counts and sizes
    Stats,

    /// Delete cached results for one step, or everything
    Clear {
        /// Step to clear; omit to clear the whole cache
        step: Option<String>,
    },
}

impl CacheCommand {
    pub async fn execute(self) -> Result<()> {
        let store = FsCacheStore::new(&self.cache_dir);
        match self.action {
            CacheAction::Stats => {
                let stats = store.stats()?;
                if stats.steps.is_empty() {
                    println!("Cache is empty: {}", self.cache_dir.display());
                    return Ok(());
                }
                println!("Cache: {}", self.cache_dir.display());
                for (step, step_stats) in &stats.steps {
                    println!(
                        "  {step:<24} {:>6} entries  {:>10} bytes",
                        step_stats.entries, step_stats.bytes
                    );
                }
                println!(
                    "  total{:>25} entries  {:>10} bytes",
                    stats.total_entries, stats.total_bytes
                );
            }
            CacheAction::Clear { step } => {
                let removed = store.clear(step.as_deref())?;
                match step {
                    Some(step) => println!("Cleared {removed} entries for step '{step}'"),
                    None => println!("Cleared {removed} entries"),
                }
            }
        }
        Ok(())
    }
}
