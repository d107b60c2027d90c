//! Per-run execution context

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::EnrichConfig;
use crate::error::EngineError;
use crate::fingerprint::{fingerprint_config, fingerprint_content, Fingerprint};
use crate::registry::StepRegistry;

/// Immutable per-run value holding the asset identity and every step's
/// config fingerprint. Created once at run start, never mutated; concurrent
/// runs each have their own.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    asset_path: PathBuf,
    content_fingerprint: Fingerprint,
    config_fingerprints: HashMap<String, Fingerprint>,
    config_slices: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Fingerprint the asset and each registered step's config slice
    pub fn prepare(
        asset: impl AsRef<Path>,
        config: &EnrichConfig,
        registry: &StepRegistry,
    ) -> Result<Self, EngineError> {
        let asset_path = asset.as_ref().to_path_buf();
        let content_fingerprint = fingerprint_content(&asset_path)?;

        let mut config_fingerprints = HashMap::with_capacity(registry.len());
        let mut config_slices = HashMap::with_capacity(registry.len());
        for name in registry.step_names() {
            let step = registry
                .get(&name)
                .ok_or_else(|| EngineError::UnknownStep(name.clone()))?;
            let slice = config.slice_for(&name, step.config_keys());
            config_fingerprints.insert(name.clone(), fingerprint_config(&name, &slice));
            config_slices.insert(name, slice);
        }

        Ok(Self {
            asset_path,
            content_fingerprint,
            config_fingerprints,
            config_slices,
        })
    }

    /// Path of the input asset
    pub fn asset_path(&self) -> &Path {
        &self.asset_path
    }

    /// Content fingerprint of the input asset
    pub fn content_fingerprint(&self) -> &Fingerprint {
        &self.content_fingerprint
    }

    /// Config fingerprint for one step
    pub fn config_fingerprint(&self, step: &str) -> Option<&Fingerprint> {
        self.config_fingerprints.get(step)
    }

    /// Declared config slice for one step (empty object when unconfigured)
    pub fn config_slice(&self, step: &str) -> Value {
        self.config_slices
            .get(step)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

/// Caller-facing knobs for one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Recompute every step even when a cache entry exists
    pub force_rerun: bool,

    /// Assume every step before this one is complete, loading its result
    /// from cache (fails with `MissingUpstreamCache` when absent)
    pub from_step: Option<String>,

    /// Stop after this step completes; the run is partial, not failed
    pub until_step: Option<String>,

    /// Job identifier; generated when not supplied
    pub job_id: Option<Uuid>,
}
