//! Typed step results
//!
//! Every step produces one [`StepPayload`] variant. The enum is serde-tagged
//! by `schema`, so persisted results are self-describing and adding a step
//! type is a compile-checked change everywhere the payload is matched.

use media_enrich_common::{EntityMention, EntityScore, ResolvedEntity, SpeakerSegment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::StepError;
use crate::fingerprint::fingerprint_value;

/// Schema-tagged result payload, one variant per step result type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum StepPayload {
    /// Speaker segmentation of the asset
    SpeakerMap {
        segments: Vec<SpeakerSegment>,
        speaker_count: u32,
    },

    /// Entity mentions found in transcript text
    EntityMentions { mentions: Vec<EntityMention> },

    /// Mentions resolved against the knowledge base
    ResolvedEntities { entities: Vec<ResolvedEntity> },

    /// Per-entity salience plus overall confidence
    EnrichmentScores {
        scores: Vec<EntityScore>,
        overall_confidence: f64,
    },

    /// Placeholder substituted when a best-effort step failed
    Degraded { step: String, reason: String },
}

impl StepPayload {
    /// Versioned schema identifier for this payload kind
    pub fn schema_id(&self) -> &'static str {
        match self {
            StepPayload::SpeakerMap { .. } => "speaker_map.v1",
            StepPayload::EntityMentions { .. } => "entity_mentions.v1",
            StepPayload::ResolvedEntities { .. } => "resolved_entities.v1",
            StepPayload::EnrichmentScores { .. } => "enrichment_scores.v1",
            StepPayload::Degraded { .. } => "degraded.v1",
        }
    }

    /// Whether this is a degraded placeholder rather than a real result
    pub fn is_degraded(&self) -> bool {
        matches!(self, StepPayload::Degraded { .. })
    }
}

/// What a step executor returns on success
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// The typed result payload
    pub payload: StepPayload,

    /// Free-form, step-supplied explainability payload (why this result)
    pub explain: Option<Value>,

    /// Non-fatal notes surfaced into the run metadata
    pub warnings: Vec<String>,
}

impl StepOutput {
    /// Output with no explain payload and no warnings
    pub fn new(payload: StepPayload) -> Self {
        Self {
            payload,
            explain: None,
            warnings: Vec::new(),
        }
    }

    /// Attach an explain payload
    pub fn with_explain(mut self, explain: Value) -> Self {
        self.explain = Some(explain);
        self
    }

    /// Attach a warning
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// A step result as persisted in the cache store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Producing step name
    pub step: String,

    /// Versioned schema identifier of the payload
    pub schema_id: String,

    /// The typed payload
    pub payload: StepPayload,

    /// Hash of the canonical serialized payload, used to detect
    /// nondeterministic executors
    pub result_fingerprint: String,
}

impl StepResult {
    /// Build a result, computing the payload fingerprint
    pub fn new(step: impl Into<String>, payload: StepPayload) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(&payload)?;
        Ok(Self {
            step: step.into(),
            schema_id: payload.schema_id().to_string(),
            result_fingerprint: fingerprint_value(&value).as_str().to_string(),
            payload,
        })
    }
}

/// Outputs of a step's declared dependencies, keyed by step name
#[derive(Debug, Clone, Default)]
pub struct StepInputs {
    results: HashMap<String, StepResult>,
}

impl StepInputs {
    /// Collect the results of `requires` from the run's result set.
    ///
    /// Fails if an upstream result is absent, which indicates an executor
    /// ordering bug rather than a user error.
    pub fn gather(
        requires: &[&str],
        available: &HashMap<String, StepResult>,
    ) -> Result<Self, StepError> {
        let mut results = HashMap::with_capacity(requires.len());
        for dep in requires {
            let result = available
                .get(*dep)
                .ok_or_else(|| StepError::MissingDependency((*dep).to_string()))?;
            results.insert((*dep).to_string(), result.clone());
        }
        Ok(Self { results })
    }

    /// The payload of one dependency
    pub fn payload(&self, step: &str) -> Result<&StepPayload, StepError> {
        self.results
            .get(step)
            .map(|r| &r.payload)
            .ok_or_else(|| StepError::MissingDependency(step.to_string()))
    }

    /// The full result of one dependency
    pub fn result(&self, step: &str) -> Result<&StepResult, StepError> {
        self.results
            .get(step)
            .ok_or_else(|| StepError::MissingDependency(step.to_string()))
    }

    /// Iterate over (step name, result) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StepResult)> {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip_is_tagged() {
        let payload = StepPayload::SpeakerMap {
            segments: vec![],
            speaker_count: 0,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["schema"], "speaker_map");

        let back: StepPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_result_fingerprint_is_deterministic() {
        let payload = StepPayload::EntityMentions { mentions: vec![] };
        let a = StepResult::new("entity-extraction", payload.clone()).unwrap();
        let b = StepResult::new("entity-extraction", payload).unwrap();
        assert_eq!(a.result_fingerprint, b.result_fingerprint);
    }

    #[test]
    fn test_gather_fails_on_missing_dependency() {
        let available = HashMap::new();
        let err = StepInputs::gather(&["diarization"], &available).unwrap_err();
        assert!(matches!(err, StepError::MissingDependency(_)));
    }
}
