//! Enrich Core - Step-based media enrichment engine
//!
//! This crate provides the core abstractions for a content-addressed
//! enrichment pipeline: a registry of dependent analysis steps, a
//! dependency-ordered executor with cache-backed resume, and provenance
//! and quality artifacts for every run.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod provenance;
pub mod quality;
pub mod registry;
pub mod result;
pub mod step;

pub use cache::{CacheKey, CacheStats, CachedProvenance, FsCacheStore, StepCacheStats};
pub use config::EnrichConfig;
pub use context::{ExecutionContext, RunOptions};
pub use error::{EngineError, StepError};
pub use executor::{Executor, RunReport};
pub use fingerprint::{canonical_json, fingerprint_config, fingerprint_content, Fingerprint};
pub use provenance::{ProvenanceRecord, RunMetadata, RunRecorder, RunTermination};
pub use quality::{QualityGate, QualityLevel, QualityReport, StepQuality, StepValidator};
pub use registry::StepRegistry;
pub use result::{StepInputs, StepOutput, StepPayload, StepResult};
pub use step::{StepDefinition, StepPolicy};
