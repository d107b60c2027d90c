//! Run configuration loaded from YAML
//!
//! The configuration is a map of step name to an arbitrary JSON object. Steps
//! declare which keys of their object are relevant via
//! [`crate::StepDefinition::config_keys`]; only that slice enters the step's
//! config fingerprint and executor invocation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::EngineError;

/// Per-step configuration for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichConfig {
    #[serde(flatten)]
    steps: BTreeMap<String, Value>,
}

impl EnrichConfig {
    /// Empty configuration (every step sees an empty slice)
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: EnrichConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Set the configuration object for one step
    pub fn set_step(&mut self, step: impl Into<String>, value: Value) {
        self.steps.insert(step.into(), value);
    }

    /// The raw configuration object for a step, if present
    pub fn step_config(&self, step: &str) -> Option<&Value> {
        self.steps.get(step)
    }

    /// Extract the subset of a step's configuration named by `keys`.
    ///
    /// Absent keys are simply omitted, so adding an unused key to the config
    /// file never changes any step's fingerprint.
    pub fn slice_for(&self, step: &str, keys: &[&str]) -> Value {
        let mut slice = Map::new();
        if let Some(Value::Object(obj)) = self.steps.get(step) {
            for key in keys {
                if let Some(v) = obj.get(*key) {
                    slice.insert((*key).to_string(), v.clone());
                }
            }
        }
        Value::Object(slice)
    }
}
