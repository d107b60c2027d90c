//! Dependency-ordered step executor
//!
//! Drives one enrichment run: resolves the step order, satisfies each step
//! from cache or by executing it, applies the per-step failure policy, and
//! writes the run artifacts whether the run succeeds or fails.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, CachedProvenance, FsCacheStore};
use crate::config::EnrichConfig;
use crate::context::{ExecutionContext, RunOptions};
use crate::error::{EngineError, StepError};
use crate::provenance::{ProvenanceRecord, RunMetadata, RunRecorder, RunTermination};
use crate::quality::{QualityGate, QualityLevel, QualityReport, StepQuality};
use crate::registry::StepRegistry;
use crate::result::{StepInputs, StepPayload, StepResult};
use crate::step::{StepDefinition, StepPolicy};

/// Everything a finished run hands back to the caller
#[derive(Debug)]
pub struct RunReport {
    /// Persisted run metadata (job id, per-step provenance, termination)
    pub metadata: RunMetadata,

    /// Final result of every step that ran or was loaded, by step name
    pub results: HashMap<String, StepResult>,

    /// Aggregated quality findings
    pub quality: QualityReport,
}

/// Enrichment run executor
pub struct Executor {
    registry: StepRegistry,
    cache: FsCacheStore,
    quality: QualityGate,
    meta_dir: PathBuf,
}

impl Executor {
    /// Executor over `registry` with cache and metadata under `work_dir`
    pub fn new(registry: StepRegistry, work_dir: impl AsRef<Path>) -> Self {
        let work_dir = work_dir.as_ref();
        Self {
            registry,
            cache: FsCacheStore::new(work_dir.join("cache")),
            quality: QualityGate::new(),
            meta_dir: work_dir.join("meta"),
        }
    }

    /// Replace the cache store
    pub fn with_cache(mut self, cache: FsCacheStore) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the metadata directory
    pub fn with_meta_dir(mut self, meta_dir: impl Into<PathBuf>) -> Self {
        self.meta_dir = meta_dir.into();
        self
    }

    /// Attach a quality gate
    pub fn with_quality_gate(mut self, gate: QualityGate) -> Self {
        self.quality = gate;
        self
    }

    /// The underlying cache store
    pub fn cache(&self) -> &FsCacheStore {
        &self.cache
    }

    /// The step registry
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Run the enrichment chain against one asset.
    ///
    /// Run artifacts are written under the metadata directory before this
    /// returns, for failed runs as well as successful ones.
    pub async fn run(
        &self,
        asset: impl AsRef<Path>,
        config: &EnrichConfig,
        options: &RunOptions,
    ) -> Result<RunReport, EngineError> {
        let ctx = ExecutionContext::prepare(asset.as_ref(), config, &self.registry)?;
        let order = self.registry.resolve_order(options.until_step.as_deref())?;

        let resume_boundary = match &options.from_step {
            Some(name) => Some(
                order
                    .iter()
                    .position(|s| s == name)
                    .ok_or_else(|| EngineError::UnknownStep(name.clone()))?,
            ),
            None => None,
        };

        let job_id = options.job_id.unwrap_or_else(Uuid::new_v4);
        let mut recorder = RunRecorder::new(&self.meta_dir, job_id);
        let mut results: HashMap<String, StepResult> = HashMap::with_capacity(order.len());
        let mut report = QualityReport::default();

        info!(
            "Run {} started: {} steps against {}",
            job_id,
            order.len(),
            ctx.asset_path().display()
        );

        for (idx, name) in order.iter().enumerate() {
            let step = self
                .registry
                .get(name)
                .ok_or_else(|| EngineError::UnknownStep(name.clone()))?;
            let key = CacheKey::for_step(step.as_ref(), &ctx);

            // Steps before the resume boundary are assumed complete and must
            // come out of the cache untouched
            if resume_boundary.is_some_and(|boundary| idx < boundary) {
                match self.cache.load(&key)? {
                    Some((result, provenance)) => {
                        debug!("Resume: loaded '{}' from cache", name);
                        self.grade_cached(name, &result, &ctx, &mut report);
                        recorder.record_step(
                            name,
                            ProvenanceRecord::from_cache(&provenance.record),
                            provenance.explain,
                        );
                        results.insert(name.clone(), result);
                        continue;
                    }
                    None => {
                        let err = EngineError::MissingUpstreamCache {
                            from_step: options.from_step.clone().unwrap_or_default(),
                            step: name.clone(),
                            cache_key: key.to_string(),
                        };
                        let termination = RunTermination::Failed {
                            step: name.clone(),
                            error: err.to_string(),
                        };
                        self.finish(recorder, &ctx, termination, &report)?;
                        return Err(err);
                    }
                }
            }

            // Cache hit path. A hit is only honored when the upstream result
            // fingerprints it was computed from still match this run, so a
            // changed dependency invalidates its whole downstream chain even
            // though the key itself is scoped to this step.
            if !options.force_rerun && step.cacheable() {
                if let Some((result, provenance)) = self.cache.load(&key)? {
                    if inputs_match(step.requires(), &results, &provenance.record.input_fingerprints)
                    {
                        info!("Step '{}': cache hit", name);
                        self.grade_cached(name, &result, &ctx, &mut report);
                        recorder.record_step(
                            name,
                            ProvenanceRecord::from_cache(&provenance.record),
                            provenance.explain,
                        );
                        results.insert(name.clone(), result);
                        continue;
                    }
                    debug!("Step '{}': cached entry has stale inputs, recomputing", name);
                }
            }

            // Execute
            let inputs = match StepInputs::gather(step.requires(), &results) {
                Ok(inputs) => inputs,
                Err(source) => {
                    let err = EngineError::StepExecution {
                        step: name.clone(),
                        source,
                    };
                    let termination = RunTermination::Failed {
                        step: name.clone(),
                        error: err.to_string(),
                    };
                    self.finish(recorder, &ctx, termination, &report)?;
                    return Err(err);
                }
            };
            let input_fingerprints: BTreeMap<String, String> = inputs
                .iter()
                .map(|(dep, res)| (dep.clone(), res.result_fingerprint.clone()))
                .collect();
            let config_slice = ctx.config_slice(name);

            info!("Step '{}': executing (v{})", name, step.version());
            let started = Instant::now();
            let outcome = step.execute(&inputs, &config_slice, &ctx).await;
            let duration = started.elapsed();

            let (result, explain) = match outcome {
                Ok(output) => {
                    for warning in &output.warnings {
                        recorder.add_warning(format!("{name}: {warning}"));
                    }
                    let result = StepResult::new(name.clone(), output.payload).map_err(|e| {
                        EngineError::Serialization {
                            step: name.clone(),
                            source: e,
                        }
                    })?;
                    (result, output.explain)
                }
                Err(source) => match step.policy() {
                    StepPolicy::Required => {
                        warn!("Required step '{}' failed: {}", name, source);
                        report.add(StepQuality::with_issue(
                            name,
                            QualityLevel::Failed,
                            source.to_string(),
                        ));
                        let err = EngineError::StepExecution {
                            step: name.clone(),
                            source,
                        };
                        let termination = RunTermination::Failed {
                            step: name.clone(),
                            error: err.to_string(),
                        };
                        self.finish(recorder, &ctx, termination, &report)?;
                        return Err(err);
                    }
                    StepPolicy::BestEffort => {
                        warn!(
                            "Best-effort step '{}' failed, substituting placeholder: {}",
                            name, source
                        );
                        recorder.add_warning(format!("{name}: failed ({source})"));
                        report.recommend(format!(
                            "rerun step '{name}' with force to replace the degraded placeholder"
                        ));
                        report.add(StepQuality::with_issue(
                            name,
                            QualityLevel::Degraded,
                            source.to_string(),
                        ));
                        let result = StepResult::new(
                            name.clone(),
                            StepPayload::Degraded {
                                step: name.clone(),
                                reason: source.to_string(),
                            },
                        )
                        .map_err(|e| EngineError::Serialization {
                            step: name.clone(),
                            source: e,
                        })?;
                        (result, None)
                    }
                },
            };

            // Real (non-degraded) outputs get their quality finding here;
            // degraded placeholders were graded in the failure arm above
            if !result.payload.is_degraded() {
                report.add(self.quality.assess(&result, &config_slice));
            }

            let record =
                ProvenanceRecord::computed(key.clone(), duration, input_fingerprints, &result);

            if step.cacheable() {
                if options.force_rerun {
                    if let Some((previous, _)) = self.cache.load(&key)? {
                        if previous.result_fingerprint != result.result_fingerprint {
                            let msg = format!(
                                "{name}: forced rerun produced a different result for the same key, executor may be nondeterministic"
                            );
                            warn!("{msg}");
                            recorder.add_warning(msg);
                        }
                    }
                }
                self.cache.store(
                    &key,
                    &result,
                    &CachedProvenance {
                        record: record.clone(),
                        explain: explain.clone(),
                    },
                )?;
            }

            recorder.record_step(name, record, explain);
            results.insert(name.clone(), result);
        }

        let termination = match &options.until_step {
            Some(target) => RunTermination::StoppedByRequest {
                until_step: target.clone(),
            },
            None => RunTermination::Completed,
        };
        let metadata = self.finish(recorder, &ctx, termination, &report)?;

        info!(
            "Run {} finished: overall quality {}",
            job_id, report.overall
        );
        Ok(RunReport {
            metadata,
            results,
            quality: report,
        })
    }

    /// Quality finding for a result loaded from cache. Degraded placeholders
    /// are graded directly and repeat the force-rerun hint, so runs that only
    /// hit the placeholder still surface it; everything else goes through the
    /// step's validator.
    fn grade_cached(
        &self,
        name: &str,
        result: &StepResult,
        ctx: &ExecutionContext,
        report: &mut QualityReport,
    ) {
        if let StepPayload::Degraded { reason, .. } = &result.payload {
            report.recommend(format!(
                "rerun step '{name}' with force to replace the degraded placeholder"
            ));
            report.add(StepQuality::with_issue(
                name,
                QualityLevel::Degraded,
                reason.clone(),
            ));
        } else {
            report.add(self.quality.assess(result, &ctx.config_slice(name)));
        }
    }

    fn finish(
        &self,
        recorder: RunRecorder,
        ctx: &ExecutionContext,
        termination: RunTermination,
        quality: &QualityReport,
    ) -> Result<RunMetadata, EngineError> {
        recorder.finish(
            ctx.asset_path(),
            ctx.content_fingerprint().as_str(),
            termination,
            quality,
        )
    }
}

/// Whether a cached entry's recorded upstream fingerprints still match the
/// results computed earlier in this run
fn inputs_match(
    requires: &[&str],
    results: &HashMap<String, StepResult>,
    stored: &BTreeMap<String, String>,
) -> bool {
    if requires.len() != stored.len() {
        return false;
    }
    requires.iter().all(|dep| {
        results.get(*dep).map(|r| r.result_fingerprint.as_str())
            == stored.get(*dep).map(String::as_str)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::StepOutput;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingStep {
        name: &'static str,
        requires: Vec<&'static str>,
        policy: StepPolicy,
        fail: bool,
        executions: Arc<AtomicUsize>,
    }

    impl CountingStep {
        fn ok(name: &'static str, requires: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                requires,
                policy: StepPolicy::Required,
                fail: false,
                executions: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn failing(name: &'static str, requires: Vec<&'static str>, policy: StepPolicy) -> Arc<Self> {
            Arc::new(Self {
                name,
                requires,
                policy,
                fail: true,
                executions: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl StepDefinition for CountingStep {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn requires(&self) -> &[&str] {
            &self.requires
        }

        fn schema_id(&self) -> &'static str {
            "speaker_map.v1"
        }

        fn policy(&self) -> StepPolicy {
            self.policy
        }

        async fn execute(
            &self,
            _inputs: &StepInputs,
            _config: &Value,
            _ctx: &ExecutionContext,
        ) -> Result<StepOutput, StepError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StepError::ExecutionFailed("boom".to_string()));
            }
            Ok(StepOutput::new(StepPayload::SpeakerMap {
                segments: vec![],
                speaker_count: 1,
            })
            .with_explain(json!({"method": "fixture"})))
        }
    }

    fn write_asset(dir: &Path) -> PathBuf {
        let path = dir.join("asset.mp4");
        std::fs::write(&path, b"fixture media bytes").unwrap();
        path
    }

    #[tokio::test]
    async fn test_second_run_is_all_cache_hits() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_asset(dir.path());

        let a = CountingStep::ok("a", vec![]);
        let b = CountingStep::ok("b", vec!["a"]);
        let a_count = Arc::clone(&a.executions);
        let b_count = Arc::clone(&b.executions);

        let mut registry = StepRegistry::new();
        registry.register(a).unwrap();
        registry.register(b).unwrap();
        let executor = Executor::new(registry, dir.path().join("work"));

        let config = EnrichConfig::new();
        let options = RunOptions::default();

        let first = executor.run(&asset, &config, &options).await.unwrap();
        let second = executor.run(&asset, &config, &options).await.unwrap();

        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
        assert!(!first.metadata.steps["a"].cache_hit);
        assert!(second.metadata.steps["a"].cache_hit);
        assert!(second.metadata.steps["b"].cache_hit);
        assert_eq!(
            first.results["b"].result_fingerprint,
            second.results["b"].result_fingerprint
        );
    }

    #[tokio::test]
    async fn test_force_rerun_recomputes() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_asset(dir.path());

        let a = CountingStep::ok("a", vec![]);
        let a_count = Arc::clone(&a.executions);

        let mut registry = StepRegistry::new();
        registry.register(a).unwrap();
        let executor = Executor::new(registry, dir.path().join("work"));

        let config = EnrichConfig::new();
        executor
            .run(&asset, &config, &RunOptions::default())
            .await
            .unwrap();
        executor
            .run(
                &asset,
                &config,
                &RunOptions {
                    force_rerun: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(a_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_required_failure_aborts_and_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_asset(dir.path());

        let mut registry = StepRegistry::new();
        registry
            .register(CountingStep::failing("a", vec![], StepPolicy::Required))
            .unwrap();
        let executor = Executor::new(registry, dir.path().join("work"));

        let options = RunOptions {
            job_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let err = executor
            .run(&asset, &EnrichConfig::new(), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StepExecution { .. }));

        let job_id = options.job_id.unwrap();
        let meta = dir.path().join("work/meta").join(format!("{job_id}.json"));
        let metadata: RunMetadata =
            serde_json::from_str(&std::fs::read_to_string(meta).unwrap()).unwrap();
        assert!(matches!(metadata.termination, RunTermination::Failed { .. }));
    }

    #[tokio::test]
    async fn test_best_effort_failure_degrades_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_asset(dir.path());

        let mut registry = StepRegistry::new();
        registry
            .register(CountingStep::failing("a", vec![], StepPolicy::BestEffort))
            .unwrap();
        registry.register(CountingStep::ok("b", vec!["a"])).unwrap();
        let executor = Executor::new(registry, dir.path().join("work"));

        let report = executor
            .run(&asset, &EnrichConfig::new(), &RunOptions::default())
            .await
            .unwrap();

        assert!(report.results["a"].payload.is_degraded());
        assert!(report.results.contains_key("b"));
        assert_eq!(report.quality.overall, QualityLevel::Degraded);
        assert_eq!(report.metadata.termination, RunTermination::Completed);
        assert!(!report.metadata.warnings.is_empty());
        assert!(report
            .quality
            .recommendations
            .iter()
            .any(|r| r.contains("force")));
    }

    #[tokio::test]
    async fn test_until_step_skips_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_asset(dir.path());

        let a = CountingStep::ok("a", vec![]);
        let b = CountingStep::ok("b", vec!["a"]);
        let b_count = Arc::clone(&b.executions);

        let mut registry = StepRegistry::new();
        registry.register(a).unwrap();
        registry.register(b).unwrap();
        let executor = Executor::new(registry, dir.path().join("work"));

        let report = executor
            .run(
                &asset,
                &EnrichConfig::new(),
                &RunOptions {
                    until_step: Some("a".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(b_count.load(Ordering::SeqCst), 0);
        assert!(!report.results.contains_key("b"));
        assert_eq!(
            report.metadata.termination,
            RunTermination::StoppedByRequest {
                until_step: "a".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_from_step_requires_cached_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_asset(dir.path());

        let mut registry = StepRegistry::new();
        registry.register(CountingStep::ok("a", vec![])).unwrap();
        registry.register(CountingStep::ok("b", vec!["a"])).unwrap();
        let executor = Executor::new(registry, dir.path().join("work"));

        let options = RunOptions {
            from_step: Some("b".to_string()),
            ..Default::default()
        };
        let err = executor
            .run(&asset, &EnrichConfig::new(), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingUpstreamCache { .. }));

        // Populate the cache, then the resume succeeds
        executor
            .run(&asset, &EnrichConfig::new(), &RunOptions::default())
            .await
            .unwrap();
        let report = executor
            .run(&asset, &EnrichConfig::new(), &options)
            .await
            .unwrap();
        assert!(report.metadata.steps["a"].cache_hit);
    }
}
