//! Error types for the enrichment engine

use thiserror::Error;

/// Hard failures that abort a run or reject a registration.
///
/// Every variant carries enough context (step name, cache key, cause) for the
/// caller to decide between retry, abort, and resume-from-earlier-step.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("step '{step}' is already registered")]
    DuplicateStep { step: String },

    #[error("registering step '{step}' would create a dependency cycle")]
    CycleDetected { step: String },

    #[error("step '{step}' requires unknown step '{requires}'")]
    UnknownDependency { step: String, requires: String },

    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error(
        "cannot resume from '{from_step}': no cache entry for upstream step '{step}' (key {cache_key})"
    )]
    MissingUpstreamCache {
        from_step: String,
        step: String,
        cache_key: String,
    },

    #[error("step '{step}' failed: {source}")]
    StepExecution {
        step: String,
        #[source]
        source: StepError,
    },

    #[error("result of step '{step}' failed to round-trip through the cache format: {source}")]
    Serialization {
        step: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised inside a step executor body.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing dependency output: {0}")]
    MissingDependency(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}
