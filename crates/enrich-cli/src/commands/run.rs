//! Run command implementation

use super::registry_helper::{build_quality_gate, build_registry};
use anyhow::{Context as _, Result};
use clap::Args;
use enrich_core::{EnrichConfig, Executor, FsCacheStore, RunOptions};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

#[derive(Args)]
pub struct RunCommand {
    /// Input media asset
    #[arg(value_name = "ASSET")]
    asset: PathBuf,

    /// YAML config with one section per step name
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recompute every step, ignoring cached results
    #[arg(long)]
    force: bool,

    /// Assume steps before this one are complete and load them from cache
    #[arg(long, value_name = "STEP")]
    from_step: Option<String>,

    /// Stop after this step; downstream steps are not run
    #[arg(long, value_name = "STEP")]
    until_step: Option<String>,

    /// Step result cache directory
    #[arg(long, default_value = "cache")]
    cache_dir: PathBuf,

    /// Run metadata directory
    #[arg(long, default_value = "meta")]
    meta_dir: PathBuf,

    /// Job identifier; generated when omitted
    #[arg(long)]
    job_id: Option<Uuid>,
}

impl RunCommand {
    pub async fn execute(self) -> Result<()> {
        if !self.asset.exists() {
            anyhow::bail!("Asset does not exist: {}", self.asset.display());
        }

        let config = match &self.config {
            Some(path) => EnrichConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EnrichConfig::new(),
        };

        let registry = build_registry()?;
        let executor = Executor::new(registry, ".")
            .with_cache(FsCacheStore::new(&self.cache_dir))
            .with_meta_dir(&self.meta_dir)
            .with_quality_gate(build_quality_gate());

        let options = RunOptions {
            force_rerun: self.force,
            from_step: self.from_step.clone(),
            until_step: self.until_step.clone(),
            job_id: self.job_id,
        };

        info!("Enriching {}", self.asset.display());
        let report = executor
            .run(&self.asset, &config, &options)
            .await
            .context("Enrichment run failed")?;

        println!("Job {}", report.metadata.job_id);
        println!("Asset: {}", report.metadata.asset_path.display());
        println!("Content fingerprint: {}", report.metadata.content_fingerprint);
        println!();
        for step in &report.metadata.step_order {
            let record = &report.metadata.steps[step];
            let quality = report
                .quality
                .steps
                .get(step)
                .map(|q| q.level.to_string())
                .unwrap_or_else(|| "-".to_string());
            let source = if record.cache_hit {
                "cache".to_string()
            } else {
                format!("{} ms", record.duration_ms)
            };
            println!("  {step:<24} {source:>10}  quality: {quality}");
        }
        println!();
        for warning in &report.metadata.warnings {
            println!("  warning: {warning}");
        }
        for recommendation in &report.quality.recommendations {
            println!("  recommendation: {recommendation}");
        }
        println!("Termination: {:?}", report.metadata.termination);
        println!("Overall quality: {}", report.quality.overall);
        println!(
            "Artifacts: {}",
            self.meta_dir
                .join(format!("{}.json", report.metadata.job_id))
                .display()
        );
        Ok(())
    }
}
