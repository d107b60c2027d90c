//! Media Enrich - step-based media enrichment workspace
//!
//! Facade over the engine crate and the shared domain types. The individual
//! steps live in their own crates and are wired together by the CLI's
//! registry helper.

pub use enrich_core::{
    CacheKey, EnrichConfig, EngineError, Executor, ExecutionContext, Fingerprint, FsCacheStore,
    ProvenanceRecord, QualityGate, QualityLevel, QualityReport, RunMetadata, RunOptions,
    RunReport, RunTermination, StepDefinition, StepError, StepInputs, StepOutput, StepPayload,
    StepPolicy, StepRegistry, StepResult,
};

pub use media_enrich_common::{EntityMention, EntityScore, ResolvedEntity, SpeakerSegment};
