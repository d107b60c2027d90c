//! Step wrapper for mention extraction

use async_trait::async_trait;
use enrich_core::{
    ExecutionContext, QualityLevel, StepDefinition, StepError, StepInputs, StepOutput,
    StepPayload, StepQuality, StepResult, StepValidator,
};
use serde_json::{json, Value};
use tracing::info;

use crate::{extract_mentions, ExtractionConfig};

/// Entity mention extraction step
#[derive(Debug, Default)]
pub struct EntityExtractionStep;

#[async_trait]
impl StepDefinition for EntityExtractionStep {
    fn name(&self) -> &str {
        "entity-extraction"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn requires(&self) -> &[&str] {
        &["diarization"]
    }

    fn config_keys(&self) -> &[&str] {
        &["transcript_path", "min_mention_len"]
    }

    fn schema_id(&self) -> &'static str {
        "entity_mentions.v1"
    }

    async fn execute(
        &self,
        inputs: &StepInputs,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<StepOutput, StepError> {
        let config: ExtractionConfig = serde_json::from_value(config.clone())?;

        let StepPayload::SpeakerMap { segments, .. } = inputs.payload("diarization")? else {
            return Err(StepError::InvalidInput(
                "diarization output has unexpected schema".to_string(),
            ));
        };

        let Some(transcript_path) = &config.transcript_path else {
            // No transcript configured; the step succeeds with nothing found
            return Ok(StepOutput::new(StepPayload::EntityMentions { mentions: vec![] })
                .with_warning("no transcript_path configured, no mentions extracted"));
        };

        let transcript = std::fs::read_to_string(transcript_path)?;
        let mentions = extract_mentions(&transcript, segments, &config);

        info!(
            "Entity extraction: {} distinct mentions from {}",
            mentions.len(),
            transcript_path
        );

        let explain = json!({
            "method": "capitalized token runs within sentence boundaries",
            "transcript_path": transcript_path,
            "transcript_chars": transcript.len(),
            "mention_count": mentions.len(),
            "min_mention_len": config.min_mention_len,
        });

        Ok(StepOutput::new(StepPayload::EntityMentions { mentions }).with_explain(explain))
    }
}

/// Quality gate for extraction output
pub fn validator() -> Box<dyn StepValidator> {
    Box::new(|result: &StepResult, config: &Value| {
        let StepPayload::EntityMentions { mentions } = &result.payload else {
            anyhow::bail!("unexpected payload schema {}", result.schema_id);
        };

        let has_transcript = config
            .get("transcript_path")
            .is_some_and(|v| !v.is_null());
        if mentions.is_empty() && has_transcript {
            return Ok(StepQuality::with_issue(
                &result.step,
                QualityLevel::Degraded,
                "transcript configured but no mentions found",
            ));
        }
        if mentions.is_empty() {
            return Ok(StepQuality::with_issue(
                &result.step,
                QualityLevel::Acceptable,
                "no transcript available",
            ));
        }
        Ok(StepQuality::clean(&result.step))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrich_core::{EnrichConfig, StepRegistry};
    use media_enrich_common::SpeakerSegment;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Arc;

    fn diarization_result() -> StepResult {
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
        .unwrap()
    }

    fn ctx_for(asset: &std::path::Path, config: &EnrichConfig) -> ExecutionContext {
        let mut registry = StepRegistry::new();
        registry
            .register(Arc::new(crate::step::EntityExtractionStep))
            .ok();
        ExecutionContext::prepare(asset, config, &registry).unwrap()
    }

    #[tokio::test]
    async fn test_execute_with_transcript() {
        let mut asset = tempfile::NamedTempFile::new().unwrap();
        asset.write_all(b"media").unwrap();
        let mut transcript = tempfile::NamedTempFile::new().unwrap();
        transcript
            .write_all(b"Alice talked about the Mariana Trench at length.")
            .unwrap();
        transcript.flush().unwrap();

        let config = json!({
            "transcript_path": transcript.path().to_string_lossy(),
        });
        let mut available = HashMap::new();
        available.insert("diarization".to_string(), diarization_result());
        let inputs = StepInputs::gather(&["diarization"], &available).unwrap();

        let enrich_config = EnrichConfig::new();
        let ctx = ctx_for(asset.path(), &enrich_config);
        let output = EntityExtractionStep
            .execute(&inputs, &config, &ctx)
            .await
            .unwrap();

        let StepPayload::EntityMentions { mentions } = &output.payload else {
            panic!("wrong payload");
        };
        assert!(mentions.iter().any(|m| m.surface == "Mariana Trench"));
    }

    #[tokio::test]
    async fn test_execute_without_transcript_is_empty_with_warning() {
        let mut asset = tempfile::NamedTempFile::new().unwrap();
        asset.write_all(b"media").unwrap();

        let mut available = HashMap::new();
        available.insert("diarization".to_string(), diarization_result());
        let inputs = StepInputs::gather(&["diarization"], &available).unwrap();

        let enrich_config = EnrichConfig::new();
        let ctx = ctx_for(asset.path(), &enrich_config);
        let output = EntityExtractionStep
            .execute(&inputs, &json!({}), &ctx)
            .await
            .unwrap();

        let StepPayload::EntityMentions { mentions } = &output.payload else {
            panic!("wrong payload");
        };
        assert!(mentions.is_empty());
        assert!(!output.warnings.is_empty());
    }

    #[test]
    fn test_validator_degrades_empty_result_with_transcript() {
        let result = StepResult::new(
            "entity-extraction",
            StepPayload::EntityMentions { mentions: vec![] },
        )
        .unwrap();
        let quality = validator()
            .validate(&result, &json!({"transcript_path": "t.txt"}))
            .unwrap();
        assert_eq!(quality.level, QualityLevel::Degraded);

        let quality = validator().validate(&result, &json!({})).unwrap();
        assert_eq!(quality.level, QualityLevel::Acceptable);
    }
}
