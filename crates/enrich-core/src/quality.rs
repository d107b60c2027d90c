//! Fail-soft quality gating
//!
//! Steps can register validators that grade their output after execution.
//! A validator never aborts a run: an error raised by the validator itself
//! is downgraded to a [`QualityLevel::Degraded`] finding with the error
//! message as the issue. The run report rolls individual grades up to the
//! worst level observed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::result::StepResult;

/// Output quality grade, ordered from worst to best
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    /// Output unusable
    Failed,

    /// Output usable but known-impaired
    Degraded,

    /// Output meets the minimum bar
    Acceptable,

    /// Output is solid
    Good,

    /// Nothing to flag
    #[default]
    Excellent,
}

impl QualityLevel {
    /// Whether downstream consumers should trust this output without review
    pub fn is_usable(self) -> bool {
        self >= QualityLevel::Acceptable
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QualityLevel::Failed => "failed",
            QualityLevel::Degraded => "degraded",
            QualityLevel::Acceptable => "acceptable",
            QualityLevel::Good => "good",
            QualityLevel::Excellent => "excellent",
        };
        f.write_str(s)
    }
}

/// Quality finding for one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepQuality {
    /// Step name
    pub step: String,

    /// Whether the output clears the usability bar
    pub passed: bool,

    /// Assigned grade
    pub level: QualityLevel,

    /// Human-readable findings behind the grade
    pub issues: Vec<String>,
}

impl StepQuality {
    /// A clean finding with no issues
    pub fn clean(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            passed: true,
            level: QualityLevel::Excellent,
            issues: Vec::new(),
        }
    }

    /// A finding at `level` with a single issue
    pub fn with_issue(
        step: impl Into<String>,
        level: QualityLevel,
        issue: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            passed: level.is_usable(),
            level,
            issues: vec![issue.into()],
        }
    }
}

/// Grades one step's output
pub trait StepValidator: Send + Sync {
    /// Inspect a result and return a grade.
    /// Errors are treated as a degraded finding, not a run failure.
    fn validate(&self, result: &StepResult, config: &Value) -> anyhow::Result<StepQuality>;
}

impl<F> StepValidator for F
where
    F: Fn(&StepResult, &Value) -> anyhow::Result<StepQuality> + Send + Sync,
{
    fn validate(&self, result: &StepResult, config: &Value) -> anyhow::Result<StepQuality> {
        self(result, config)
    }
}

/// Registry of validators, keyed by step name
#[derive(Default)]
pub struct QualityGate {
    validators: HashMap<String, Box<dyn StepValidator>>,
}

impl QualityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a validator to a step, replacing any previous one
    pub fn register(&mut self, step: impl Into<String>, validator: Box<dyn StepValidator>) {
        self.validators.insert(step.into(), validator);
    }

    /// Grade one step's output.
    ///
    /// A step without a validator passes clean. A validator that itself
    /// errors yields a degraded finding carrying the error text.
    pub fn assess(&self, result: &StepResult, config: &Value) -> StepQuality {
        let Some(validator) = self.validators.get(&result.step) else {
            return StepQuality::clean(&result.step);
        };
        match validator.validate(result, config) {
            Ok(quality) => quality,
            Err(e) => {
                warn!("Validator for step '{}' failed: {e}", result.step);
                StepQuality::with_issue(
                    &result.step,
                    QualityLevel::Degraded,
                    format!("validator error: {e}"),
                )
            }
        }
    }
}

impl std::fmt::Debug for QualityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGate")
            .field("steps", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Aggregated quality findings for a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityReport {
    /// Worst grade across all steps
    pub overall: QualityLevel,

    /// Per-step findings, keyed by step name
    pub steps: BTreeMap<String, StepQuality>,

    /// Engine-level followups (e.g. rerun a step with force)
    pub recommendations: Vec<String>,
}

impl QualityReport {
    /// Fold a step finding into the report
    pub fn add(&mut self, quality: StepQuality) {
        self.overall = self.overall.min(quality.level);
        self.steps.insert(quality.step.clone(), quality);
    }

    /// Attach an engine-level recommendation
    pub fn recommend(&mut self, recommendation: impl Into<String>) {
        self.recommendations.push(recommendation.into());
    }
}
