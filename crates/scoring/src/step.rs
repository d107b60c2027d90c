//! Step wrapper for scoring

use async_trait::async_trait;
use enrich_core::{
    ExecutionContext, QualityLevel, StepDefinition, StepError, StepInputs, StepOutput,
    StepPayload, StepQuality, StepResult, StepValidator,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::score_entities;

/// Enrichment scoring step
#[derive(Debug, Default)]
pub struct ScoringStep;

#[async_trait]
impl StepDefinition for ScoringStep {
    fn name(&self) -> &str {
        "scoring"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn requires(&self) -> &[&str] {
        &["diarization", "entity-disambiguation"]
    }

    fn schema_id(&self) -> &'static str {
        "enrichment_scores.v1"
    }

    async fn execute(
        &self,
        inputs: &StepInputs,
        _config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<StepOutput, StepError> {
        let StepPayload::SpeakerMap { segments, .. } = inputs.payload("diarization")? else {
            return Err(StepError::InvalidInput(
                "diarization output has unexpected schema".to_string(),
            ));
        };

        // Upstream disambiguation is best-effort; score nothing rather than
        // fail the run when it left a degraded placeholder behind
        let entities = match inputs.payload("entity-disambiguation")? {
            StepPayload::ResolvedEntities { entities } => entities.as_slice(),
            StepPayload::Degraded { reason, .. } => {
                warn!("Scoring over degraded disambiguation output: {reason}");
                let output = StepOutput::new(StepPayload::EnrichmentScores {
                    scores: vec![],
                    overall_confidence: 0.0,
                })
                .with_warning(format!("upstream disambiguation degraded: {reason}"));
                return Ok(output);
            }
            _ => {
                return Err(StepError::InvalidInput(
                    "entity-disambiguation output has unexpected schema".to_string(),
                ))
            }
        };

        let scoring = score_entities(entities, segments);
        info!(
            "Scoring: {} entities, overall confidence {:.3}",
            scoring.scores.len(),
            scoring.overall_confidence
        );

        let explain = json!({
            "method": "confidence-normalized salience, speaker-diversity damping",
            "entity_count": scoring.scores.len(),
            "distinct_speakers": segments.iter().map(|s| s.speaker.as_str()).collect::<std::collections::BTreeSet<_>>().len(),
            "overall_confidence": scoring.overall_confidence,
        });

        Ok(StepOutput::new(StepPayload::EnrichmentScores {
            scores: scoring.scores,
            overall_confidence: scoring.overall_confidence,
        })
        .with_explain(explain))
    }
}

/// Quality gate for scoring output
pub fn validator() -> Box<dyn StepValidator> {
    Box::new(|result: &StepResult, _config: &Value| {
        let StepPayload::EnrichmentScores {
            scores,
            overall_confidence,
        } = &result.payload
        else {
            anyhow::bail!("unexpected payload schema {}", result.schema_id);
        };
        if scores.is_empty() {
            return Ok(StepQuality::with_issue(
                &result.step,
                QualityLevel::Degraded,
                "no entities to score",
            ));
        }
        if *overall_confidence < 0.5 {
            return Ok(StepQuality::with_issue(
                &result.step,
                QualityLevel::Acceptable,
                format!("low overall confidence {overall_confidence:.2}"),
            ));
        }
        Ok(StepQuality::clean(&result.step))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrich_core::{EnrichConfig, StepRegistry};
    use media_enrich_common::{ResolvedEntity, SpeakerSegment};
    use std::collections::HashMap;
    use std::io::Write;

    fn available() -> HashMap<String, StepResult> {
        let mut map = HashMap::new();
        map.insert(
            "diarization".to_string(),
            StepResult::new(
                "diarization",
                StepPayload::SpeakerMap {
                    segments: vec![SpeakerSegment {
                        start_secs: 0.0,
                        end_secs: 10.0,
                        speaker: "SPEAKER_00".to_string(),
                    }],
                    speaker_count: 1,
                },
            )
            .unwrap(),
        );
        map.insert(
            "entity-disambiguation".to_string(),
            StepResult::new(
                "entity-disambiguation",
                StepPayload::ResolvedEntities {
                    entities: vec![ResolvedEntity {
                        surface: "Alice".to_string(),
                        kb_id: Some("kb:alice".to_string()),
                        canonical_name: Some("Alice Liddell".to_string()),
                        confidence: 0.9,
                    }],
                },
            )
            .unwrap(),
        );
        map
    }

    async fn run_step(available: HashMap<String, StepResult>) -> StepOutput {
        let mut asset = tempfile::NamedTempFile::new().unwrap();
        asset.write_all(b"media").unwrap();
        let registry = StepRegistry::new();
        let ctx =
            ExecutionContext::prepare(asset.path(), &EnrichConfig::new(), &registry).unwrap();
        let inputs =
            StepInputs::gather(&["diarization", "entity-disambiguation"], &available).unwrap();
        ScoringStep
            .execute(&inputs, &Value::Null, &ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_scores_resolved_entities() {
        let output = run_step(available()).await;
        let StepPayload::EnrichmentScores {
            scores,
            overall_confidence,
        } = &output.payload
        else {
            panic!("wrong payload");
        };
        assert_eq!(scores.len(), 1);
        assert!(*overall_confidence > 0.0);
    }

    #[tokio::test]
    async fn test_degraded_upstream_yields_empty_scores() {
        let mut map = available();
        map.insert(
            "entity-disambiguation".to_string(),
            StepResult::new(
                "entity-disambiguation",
                StepPayload::Degraded {
                    step: "entity-disambiguation".to_string(),
                    reason: "kb unavailable".to_string(),
                },
            )
            .unwrap(),
        );
        let output = run_step(map).await;
        let StepPayload::EnrichmentScores { scores, .. } = &output.payload else {
            panic!("wrong payload");
        };
        assert!(scores.is_empty());
        assert!(!output.warnings.is_empty());
    }

    #[test]
    fn test_validator_flags_empty_scores() {
        let result = StepResult::new(
            "scoring",
            StepPayload::EnrichmentScores {
                scores: vec![],
                overall_confidence: 0.0,
            },
        )
        .unwrap();
        let quality = validator().validate(&result, &Value::Null).unwrap();
        assert_eq!(quality.level, QualityLevel::Degraded);
    }
}
