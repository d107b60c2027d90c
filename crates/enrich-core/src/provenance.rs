//! Provenance records and run-level artifacts
//!
//! Every step invocation, computed or served from cache, produces a
//! [`ProvenanceRecord`]. The [`RunRecorder`] aggregates these with the
//! explain payloads and the quality report into three artifacts under the
//! metadata directory:
//!
//! ```text
//! meta/{job_id}.json          run metadata and per-step records
//! meta/{job_id}.explain.json  step explain payloads
//! meta/{job_id}.quality.json  quality report
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::cache::CacheKey;
use crate::error::EngineError;
use crate::quality::QualityReport;
use crate::result::StepResult;

/// Record of one step invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Cache key the invocation resolved to
    pub cache_key: CacheKey,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// Wall-clock execution time; zero for cache hits
    pub duration_ms: u64,

    /// Whether the result was served from cache
    pub cache_hit: bool,

    /// Result fingerprints of the upstream steps consumed, by step name
    pub input_fingerprints: BTreeMap<String, String>,

    /// Fingerprint of the produced result
    pub output_fingerprint: String,
}

impl ProvenanceRecord {
    /// Record for a freshly computed result
    pub fn computed(
        cache_key: CacheKey,
        duration: Duration,
        input_fingerprints: BTreeMap<String, String>,
        result: &StepResult,
    ) -> Self {
        Self {
            cache_key,
            created_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            cache_hit: false,
            input_fingerprints,
            output_fingerprint: result.result_fingerprint.clone(),
        }
    }

    /// Record for a result served from cache during this run
    pub fn from_cache(original: &ProvenanceRecord) -> Self {
        Self {
            cache_key: original.cache_key.clone(),
            created_at: Utc::now(),
            duration_ms: 0,
            cache_hit: true,
            input_fingerprints: original.input_fingerprints.clone(),
            output_fingerprint: original.output_fingerprint.clone(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunTermination {
    /// Every scheduled step finished
    Completed,

    /// The run stopped at a requested target step
    StoppedByRequest {
        /// The target step
        until_step: String,
    },

    /// A required step failed
    Failed {
        /// The failing step
        step: String,

        /// Rendered error message
        error: String,
    },
}

/// Run-level metadata persisted as `meta/{job_id}.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Unique job id
    pub job_id: Uuid,

    /// Input asset path as given
    pub asset_path: PathBuf,

    /// Content fingerprint of the asset
    pub content_fingerprint: String,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished
    pub finished_at: DateTime<Utc>,

    /// How the run ended
    pub termination: RunTermination,

    /// Total wall-clock duration of the run
    pub total_duration_ms: u64,

    /// Steps served from cache
    pub cache_hits: u32,

    /// Steps that were computed
    pub cache_misses: u32,

    /// Steps in the order they were scheduled
    pub step_order: Vec<String>,

    /// One record per invoked step, keyed by step name
    pub steps: BTreeMap<String, ProvenanceRecord>,

    /// Warnings surfaced during the run
    pub warnings: Vec<String>,
}

/// Accumulates per-step records and writes the run artifacts
#[derive(Debug)]
pub struct RunRecorder {
    meta_dir: PathBuf,
    job_id: Uuid,
    started_at: DateTime<Utc>,
    step_order: Vec<String>,
    records: BTreeMap<String, ProvenanceRecord>,
    explains: BTreeMap<String, Value>,
    warnings: Vec<String>,
}

impl RunRecorder {
    /// Start recording a run under `meta_dir`
    pub fn new(meta_dir: impl Into<PathBuf>, job_id: Uuid) -> Self {
        Self {
            meta_dir: meta_dir.into(),
            job_id,
            started_at: Utc::now(),
            step_order: Vec::new(),
            records: BTreeMap::new(),
            explains: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Job id this recorder was created with
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Record one step invocation
    pub fn record_step(
        &mut self,
        step: &str,
        record: ProvenanceRecord,
        explain: Option<Value>,
    ) {
        self.step_order.push(step.to_string());
        self.records.insert(step.to_string(), record);
        if let Some(explain) = explain {
            self.explains.insert(step.to_string(), explain);
        }
    }

    /// Attach a run-level warning
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Finish the run and write all three artifacts.
    /// Returns the metadata that was persisted.
    pub fn finish(
        self,
        asset_path: &Path,
        content_fingerprint: &str,
        termination: RunTermination,
        quality: &QualityReport,
    ) -> Result<RunMetadata, EngineError> {
        let finished_at = Utc::now();
        let cache_hits = self.records.values().filter(|r| r.cache_hit).count() as u32;
        let metadata = RunMetadata {
            job_id: self.job_id,
            asset_path: asset_path.to_path_buf(),
            content_fingerprint: content_fingerprint.to_string(),
            started_at: self.started_at,
            finished_at,
            termination,
            total_duration_ms: (finished_at - self.started_at).num_milliseconds().max(0) as u64,
            cache_hits,
            cache_misses: self.records.len() as u32 - cache_hits,
            step_order: self.step_order,
            steps: self.records,
            warnings: self.warnings,
        };

        std::fs::create_dir_all(&self.meta_dir)?;
        write_json(
            &self.meta_dir.join(format!("{}.json", self.job_id)),
            &metadata,
        )?;
        write_json(
            &self.meta_dir.join(format!("{}.explain.json", self.job_id)),
            &self.explains,
        )?;
        write_json(
            &self.meta_dir.join(format!("{}.quality.json", self.job_id)),
            quality,
        )?;

        info!(
            "Run {} artifacts written to {}",
            self.job_id,
            self.meta_dir.display()
        );
        Ok(metadata)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| EngineError::Serialization {
        step: path.display().to_string(),
        source: e,
    })?;
    Ok(crate::cache::write_atomic(path, &bytes)?)
}
