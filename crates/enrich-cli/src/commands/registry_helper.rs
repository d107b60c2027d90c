//! Shared step registry helper
//!
//! Centralizes step and validator registration so the run, cache and steps
//! commands all see the same chain.

use anyhow::{Context, Result};
use enrich_core::{QualityGate, StepRegistry};
use media_enrich_diarization::step as diarization;
use media_enrich_entity_disambiguation::step as disambiguation;
use media_enrich_entity_extraction::step as extraction;
use media_enrich_scoring::step as scoring;
use std::sync::Arc;

/// Register the full enrichment chain, in dependency order
pub fn build_registry() -> Result<StepRegistry> {
    let mut registry = StepRegistry::new();
    registry
        .register(Arc::new(diarization::DiarizationStep))
        .context("Failed to register diarization")?;
    registry
        .register(Arc::new(extraction::EntityExtractionStep))
        .context("Failed to register entity-extraction")?;
    registry
        .register(Arc::new(disambiguation::EntityDisambiguationStep))
        .context("Failed to register entity-disambiguation")?;
    registry
        .register(Arc::new(scoring::ScoringStep))
        .context("Failed to register scoring")?;
    Ok(registry)
}

/// Quality gate with every step's validator attached
pub fn build_quality_gate() -> QualityGate {
    let mut gate = QualityGate::new();
    gate.register("diarization", diarization::validator());
    gate.register("entity-extraction", extraction::validator());
    gate.register("entity-disambiguation", disambiguation::validator());
    gate.register("scoring", scoring::validator());
    gate
}
