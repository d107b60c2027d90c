//! Content-addressed cache store
//!
//! Layout on disk:
//!
//! ```text
//! cache/{step_name}/{content_fp}-{config_fp}-{step_version}.result.json
//! cache/{step_name}/{content_fp}-{config_fp}-{step_version}.provenance.json
//! ```
//!
//! Writes go to a temp sibling and are renamed into place, so readers never
//! observe a partially written entry. Concurrent writers for the same key are
//! redundant by construction (the key encodes everything that could make
//! results differ), so last-rename-wins needs no lock.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::provenance::ProvenanceRecord;
use crate::result::StepResult;
use crate::step::StepDefinition;

/// Cache key for one (step, content, config, version) combination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Step name
    pub step: String,

    /// Step semantic version
    pub step_version: String,

    /// Content fingerprint of the input asset
    pub content_fingerprint: String,

    /// Step-scoped config fingerprint
    pub config_fingerprint: String,
}

impl CacheKey {
    /// Derive the key for a step under a run context
    pub fn for_step(step: &dyn StepDefinition, ctx: &ExecutionContext) -> Self {
        let config_fingerprint = ctx
            .config_fingerprint(step.name())
            .map(|fp| fp.as_str().to_string())
            .unwrap_or_default();
        Self {
            step: step.name().to_string(),
            step_version: step.version().to_string(),
            content_fingerprint: ctx.content_fingerprint().as_str().to_string(),
            config_fingerprint,
        }
    }

    /// Filename stem shared by the result and provenance files
    pub fn file_stem(&self) -> String {
        format!(
            "{}-{}-{}",
            self.content_fingerprint, self.config_fingerprint, self.step_version
        )
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.step, self.file_stem())
    }
}

/// Provenance sidecar persisted next to each cached result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedProvenance {
    /// The invocation record that produced the result
    pub record: ProvenanceRecord,

    /// The step-supplied explain payload, if any
    pub explain: Option<Value>,
}

/// Per-step cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepCacheStats {
    /// Number of cached results
    pub entries: u64,

    /// Total bytes across result and provenance files
    pub bytes: u64,
}

/// Cache statistics across all steps
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Stats keyed by step name
    pub steps: BTreeMap<String, StepCacheStats>,

    /// Total cached results
    pub total_entries: u64,

    /// Total bytes
    pub total_bytes: u64,
}

/// Filesystem-backed cache store
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    /// Create a store rooted at `root` (created lazily on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn step_dir(&self, step: &str) -> PathBuf {
        self.root.join(step)
    }

    fn result_path(&self, key: &CacheKey) -> PathBuf {
        self.step_dir(&key.step)
            .join(format!("{}.result.json", key.file_stem()))
    }

    fn provenance_path(&self, key: &CacheKey) -> PathBuf {
        self.step_dir(&key.step)
            .join(format!("{}.provenance.json", key.file_stem()))
    }

    /// Whether a result exists for this key
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.result_path(key).is_file()
    }

    /// Load a cached result and its provenance sidecar.
    ///
    /// A corrupted entry (missing sidecar, malformed JSON, schema mismatch)
    /// is treated as a cache miss, never a hard failure: the engine
    /// recomputes and overwrites it.
    pub fn load(&self, key: &CacheKey) -> Result<Option<(StepResult, CachedProvenance)>, EngineError> {
        let result_path = self.result_path(key);
        if !result_path.is_file() {
            return Ok(None);
        }

        let result: StepResult = match std::fs::read_to_string(&result_path)
            .map_err(EngineError::from)
            .and_then(|s| serde_json::from_str(&s).map_err(|e| EngineError::Serialization {
                step: key.step.clone(),
                source: e,
            })) {
            Ok(r) => r,
            Err(e) => {
                warn!("Corrupted cache entry {} treated as miss: {}", key, e);
                return Ok(None);
            }
        };

        let provenance: CachedProvenance = match std::fs::read_to_string(self.provenance_path(key))
            .map_err(EngineError::from)
            .and_then(|s| serde_json::from_str(&s).map_err(|e| EngineError::Serialization {
                step: key.step.clone(),
                source: e,
            })) {
            Ok(p) => p,
            Err(e) => {
                warn!("Corrupted provenance for {} treated as miss: {}", key, e);
                return Ok(None);
            }
        };

        debug!("Cache hit for {}", key);
        Ok(Some((result, provenance)))
    }

    /// Persist a result and its provenance sidecar atomically
    pub fn store(
        &self,
        key: &CacheKey,
        result: &StepResult,
        provenance: &CachedProvenance,
    ) -> Result<(), EngineError> {
        let dir = self.step_dir(&key.step);
        std::fs::create_dir_all(&dir)?;

        let result_json =
            serde_json::to_vec_pretty(result).map_err(|e| EngineError::Serialization {
                step: key.step.clone(),
                source: e,
            })?;
        let provenance_json =
            serde_json::to_vec_pretty(provenance).map_err(|e| EngineError::Serialization {
                step: key.step.clone(),
                source: e,
            })?;

        write_atomic(&self.result_path(key), &result_json)?;
        write_atomic(&self.provenance_path(key), &provenance_json)?;

        debug!("Stored cache entry {}", key);
        Ok(())
    }

    /// Per-step file counts and byte sizes
    pub fn stats(&self) -> Result<CacheStats, EngineError> {
        let mut stats = CacheStats::default();
        if !self.root.is_dir() {
            return Ok(stats);
        }

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let step = entry.file_name().to_string_lossy().to_string();
            let mut step_stats = StepCacheStats::default();
            for file in std::fs::read_dir(entry.path())? {
                let file = file?;
                let name = file.file_name().to_string_lossy().to_string();
                step_stats.bytes += file.metadata()?.len();
                if name.ends_with(".result.json") {
                    step_stats.entries += 1;
                }
            }
            stats.total_entries += step_stats.entries;
            stats.total_bytes += step_stats.bytes;
            stats.steps.insert(step, step_stats);
        }
        Ok(stats)
    }

    /// Delete cached entries for one step, or everything when `step` is None.
    /// Returns the number of results removed.
    pub fn clear(&self, step: Option<&str>) -> Result<u64, EngineError> {
        let before = self.stats()?;
        let removed = match step {
            Some(name) => {
                let dir = self.step_dir(name);
                if dir.is_dir() {
                    std::fs::remove_dir_all(&dir)?;
                }
                before.steps.get(name).map(|s| s.entries).unwrap_or(0)
            }
            None => {
                if self.root.is_dir() {
                    std::fs::remove_dir_all(&self.root)?;
                }
                before.total_entries
            }
        };
        Ok(removed)
    }
}

/// Write to a unique temp sibling, then rename into place
/// Write through a uniquely named sibling then rename, so readers never
/// observe a partially written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
