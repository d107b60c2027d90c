//! Step wrapper for disambiguation

use async_trait::async_trait;
use enrich_core::{
    ExecutionContext, QualityLevel, StepDefinition, StepError, StepInputs, StepOutput,
    StepPayload, StepPolicy, StepQuality, StepResult, StepValidator,
};
use serde_json::{json, Value};
use tracing::info;

use crate::{resolve_mentions, DisambiguationConfig, KnowledgeBase};

/// Entity disambiguation step.
///
/// Best-effort by declaration: a broken or missing knowledge base degrades
/// the run instead of aborting it, since downstream scoring can still work
/// from unresolved mentions.
#[derive(Debug, Default)]
pub struct EntityDisambiguationStep;

#[async_trait]
impl StepDefinition for EntityDisambiguationStep {
    fn name(&self) -> &str {
        "entity-disambiguation"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn requires(&self) -> &[&str] {
        &["entity-extraction"]
    }

    fn config_keys(&self) -> &[&str] {
        &["knowledge_base_path"]
    }

    fn schema_id(&self) -> &'static str {
        "resolved_entities.v1"
    }

    fn policy(&self) -> StepPolicy {
        StepPolicy::BestEffort
    }

    async fn execute(
        &self,
        inputs: &StepInputs,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<StepOutput, StepError> {
        let config: DisambiguationConfig = serde_json::from_value(config.clone())?;

        let StepPayload::EntityMentions { mentions } = inputs.payload("entity-extraction")?
        else {
            return Err(StepError::InvalidInput(
                "entity-extraction output has unexpected schema".to_string(),
            ));
        };

        let kb_path = config.knowledge_base_path.as_deref().ok_or_else(|| {
            StepError::InvalidInput("knowledge_base_path is not configured".to_string())
        })?;
        let kb = KnowledgeBase::from_json_file(kb_path)?;

        let resolutions = resolve_mentions(mentions, &kb);
        let resolved = resolutions
            .iter()
            .filter(|r| r.entity.is_resolved())
            .count();

        info!(
            "Disambiguation: {}/{} mentions resolved against {}",
            resolved,
            resolutions.len(),
            kb_path
        );

        let explain = json!({
            "knowledge_base_path": kb_path,
            "kb_entries": kb.entries.len(),
            "resolved": resolved,
            "mentions": resolutions.iter().map(|r| r.explain.clone()).collect::<Vec<_>>(),
        });

        let entities = resolutions.into_iter().map(|r| r.entity).collect();
        Ok(StepOutput::new(StepPayload::ResolvedEntities { entities }).with_explain(explain))
    }
}

/// Quality gate for disambiguation output
pub fn validator() -> Box<dyn StepValidator> {
    Box::new(|result: &StepResult, _config: &Value| {
        let StepPayload::ResolvedEntities { entities } = &result.payload else {
            anyhow::bail!("unexpected payload schema {}", result.schema_id);
        };
        if entities.is_empty() {
            return Ok(StepQuality::with_issue(
                &result.step,
                QualityLevel::Acceptable,
                "no mentions to resolve",
            ));
        }
        let resolved = entities.iter().filter(|e| e.is_resolved()).count();
        if resolved == 0 {
            return Ok(StepQuality::with_issue(
                &result.step,
                QualityLevel::Degraded,
                "no mention matched the knowledge base",
            ));
        }
        if resolved * 2 < entities.len() {
            return Ok(StepQuality::with_issue(
                &result.step,
                QualityLevel::Acceptable,
                format!("only {resolved}/{} mentions resolved", entities.len()),
            ));
        }
        Ok(StepQuality::clean(&result.step))
    })
}
