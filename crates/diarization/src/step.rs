//! Step wrapper for the diarization module

use async_trait::async_trait;
use enrich_core::{
    ExecutionContext, QualityLevel, StepDefinition, StepError, StepInputs, StepOutput,
    StepPayload, StepQuality, StepResult, StepValidator,
};
use serde_json::{json, Value};
use tracing::info;

use crate::{diarize_file, speaker_count, DiarizationConfig};

/// Speaker segmentation step
#[derive(Debug, Default)]
pub struct DiarizationStep;

#[async_trait]
impl StepDefinition for DiarizationStep {
    fn name(&self) -> &str {
        "diarization"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn config_keys(&self) -> &[&str] {
        &["min_segment_secs", "max_speakers"]
    }

    fn schema_id(&self) -> &'static str {
        "speaker_map.v1"
    }

    async fn execute(
        &self,
        _inputs: &StepInputs,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<StepOutput, StepError> {
        let config: DiarizationConfig = serde_json::from_value(config.clone())?;
        let segments = diarize_file(ctx.asset_path(), &config)?;
        let count = speaker_count(&segments);

        info!(
            "Diarization: {} segments, {} speakers",
            segments.len(),
            count
        );

        let explain = json!({
            "method": "windowed byte energy, quantized into speaker bands",
            "segment_count": segments.len(),
            "speaker_count": count,
            "min_segment_secs": config.min_segment_secs,
            "max_speakers": config.max_speakers,
        });

        let mut output = StepOutput::new(StepPayload::SpeakerMap {
            segments,
            speaker_count: count,
        })
        .with_explain(explain);

        if count == 0 {
            output = output.with_warning("no speech-like content detected");
        }
        Ok(output)
    }
}

/// Quality gate for diarization output
pub fn validator() -> Box<dyn StepValidator> {
    Box::new(|result: &StepResult, _config: &Value| {
        let StepPayload::SpeakerMap {
            segments,
            speaker_count,
        } = &result.payload
        else {
            anyhow::bail!("unexpected payload schema {}", result.schema_id);
        };

        if segments.is_empty() {
            return Ok(StepQuality::with_issue(
                &result.step,
                QualityLevel::Degraded,
                "no segments produced",
            ));
        }
        if *speaker_count == 1 {
            return Ok(StepQuality::with_issue(
                &result.step,
                QualityLevel::Acceptable,
                "single speaker across entire asset",
            ));
        }
        Ok(StepQuality::clean(&result.step))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrich_core::{EnrichConfig, StepRegistry};
    use std::io::Write;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_execute_on_real_file() {
        let mut asset = tempfile::NamedTempFile::new().unwrap();
        asset.write_all(&vec![7u8; 16 * 1024]).unwrap();
        asset.flush().unwrap();

        let mut registry = StepRegistry::new();
        registry.register(Arc::new(DiarizationStep)).unwrap();
        let ctx =
            ExecutionContext::prepare(asset.path(), &EnrichConfig::new(), &registry).unwrap();

        let output = DiarizationStep
            .execute(&StepInputs::default(), &ctx.config_slice("diarization"), &ctx)
            .await
            .unwrap();

        let StepPayload::SpeakerMap { segments, .. } = &output.payload else {
            panic!("wrong payload");
        };
        assert!(!segments.is_empty());
        assert!(output.explain.is_some());
    }

    #[test]
    fn test_validator_flags_empty_map() {
        let result = StepResult::new(
            "diarization",
            StepPayload::SpeakerMap {
                segments: vec![],
                speaker_count: 0,
            },
        )
        .unwrap();
        let quality = validator().validate(&result, &Value::Null).unwrap();
        assert_eq!(quality.level, QualityLevel::Degraded);
    }
}
