//! Step contract - all enrichment steps implement this

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::result::{StepInputs, StepOutput};

/// What the engine does when a step's executor fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPolicy {
    /// Failure aborts the run at this step
    Required,

    /// Failure substitutes a degraded placeholder and the run continues.
    /// Explicit per-step opt-in, never inferred.
    BestEffort,
}

/// Core step trait - registered once at process start, immutable thereafter
#[async_trait]
pub trait StepDefinition: Send + Sync {
    /// Unique step identifier
    fn name(&self) -> &str;

    /// Semantic version string, part of the cache key. Bump to invalidate
    /// every cached result of this step.
    fn version(&self) -> &str;

    /// Names of steps whose outputs this step consumes. Each must be
    /// registered before this step.
    fn requires(&self) -> &[&str] {
        &[]
    }

    /// Configuration keys relevant to this step. Only this slice enters the
    /// step's config fingerprint and executor invocation.
    fn config_keys(&self) -> &[&str] {
        &[]
    }

    /// Schema identifier of the payload this step produces
    fn schema_id(&self) -> &'static str;

    /// Failure policy (see [`StepPolicy`])
    fn policy(&self) -> StepPolicy {
        StepPolicy::Required
    }

    /// Whether results may be cached. Executors that are not deterministic
    /// with respect to their declared inputs must opt out.
    fn cacheable(&self) -> bool {
        true
    }

    /// Run the step against its dependencies' outputs and its config slice.
    ///
    /// Must be deterministic with respect to `inputs`, `config` and the asset
    /// identified by `ctx` whenever [`Self::cacheable`] is true.
    async fn execute(
        &self,
        inputs: &StepInputs,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<StepOutput, StepError>;
}
