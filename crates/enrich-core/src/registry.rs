//! Step registry and dependency-order resolution

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::step::StepDefinition;

/// Registry of step definitions, validated eagerly at registration
///
/// The `requires` edges across all registered steps always form a DAG:
/// registration fails with `CycleDetected` rather than deferring the check to
/// the first run.
pub struct StepRegistry {
    /// Steps in registration order (the topological tie-breaker)
    steps: Vec<Arc<dyn StepDefinition>>,

    /// Name -> index into `steps`
    by_name: HashMap<String, usize>,
}

impl StepRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            steps: Vec::with_capacity(8),
            by_name: HashMap::with_capacity(8),
        }
    }

    /// Register a step definition.
    ///
    /// Fails with `DuplicateStep` if the name is taken, `UnknownDependency`
    /// if a required step is not yet registered, and `CycleDetected` if the
    /// new edges would close a cycle.
    pub fn register(&mut self, step: Arc<dyn StepDefinition>) -> Result<(), EngineError> {
        let name = step.name().to_string();

        if self.by_name.contains_key(&name) {
            return Err(EngineError::DuplicateStep { step: name });
        }

        for dep in step.requires() {
            if *dep == name {
                return Err(EngineError::CycleDetected { step: name });
            }
            if !self.by_name.contains_key(*dep) {
                return Err(EngineError::UnknownDependency {
                    step: name,
                    requires: (*dep).to_string(),
                });
            }
        }

        info!("Registering step: {} v{}", name, step.version());

        self.by_name.insert(name.clone(), self.steps.len());
        self.steps.push(step);

        if self.has_cycle() {
            // Roll back so the registry stays usable after the error
            self.steps.pop();
            self.by_name.remove(&name);
            return Err(EngineError::CycleDetected { step: name });
        }

        Ok(())
    }

    /// Check that every `requires` entry references a registered step
    pub fn validate(&self) -> Result<(), EngineError> {
        for step in &self.steps {
            for dep in step.requires() {
                if !self.by_name.contains_key(*dep) {
                    return Err(EngineError::UnknownDependency {
                        step: step.name().to_string(),
                        requires: (*dep).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Deterministic topological order of all steps, or of `target` and its
    /// ancestors when `target` is set. Ties are broken by registration order.
    pub fn resolve_order(&self, target: Option<&str>) -> Result<Vec<String>, EngineError> {
        self.validate()?;

        // Restrict to the ancestor set of the target when one is given
        let included: HashSet<usize> = match target {
            Some(name) => {
                let idx = *self
                    .by_name
                    .get(name)
                    .ok_or_else(|| EngineError::UnknownStep(name.to_string()))?;
                let mut seen = HashSet::new();
                let mut stack = vec![idx];
                while let Some(i) = stack.pop() {
                    if !seen.insert(i) {
                        continue;
                    }
                    for dep in self.steps[i].requires() {
                        stack.push(self.by_name[*dep]);
                    }
                }
                seen
            }
            None => (0..self.steps.len()).collect(),
        };

        // Kahn's algorithm, always scanning in registration order so the
        // result is stable across runs
        let mut in_degree: HashMap<usize, usize> = included
            .iter()
            .map(|&i| (i, self.steps[i].requires().len()))
            .collect();

        let mut order = Vec::with_capacity(included.len());
        let mut done: HashSet<usize> = HashSet::with_capacity(included.len());

        while order.len() < included.len() {
            let mut progressed = false;
            for i in 0..self.steps.len() {
                if !included.contains(&i) || done.contains(&i) {
                    continue;
                }
                if in_degree[&i] == 0 {
                    done.insert(i);
                    order.push(self.steps[i].name().to_string());
                    progressed = true;
                    // Lower the in-degree of every dependent still pending
                    for (j, step) in self.steps.iter().enumerate() {
                        if included.contains(&j)
                            && !done.contains(&j)
                            && step.requires().contains(&self.steps[i].name())
                        {
                            if let Some(degree) = in_degree.get_mut(&j) {
                                *degree -= 1;
                            }
                        }
                    }
                }
            }
            if !progressed {
                // Unreachable as long as registration enforces acyclicity
                return Err(EngineError::CycleDetected {
                    step: self
                        .steps
                        .iter()
                        .enumerate()
                        .find(|(i, _)| included.contains(i) && !done.contains(i))
                        .map(|(_, s)| s.name().to_string())
                        .unwrap_or_default(),
                });
            }
        }

        debug!("Resolved step order: {:?}", order);
        Ok(order)
    }

    /// Get a step by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn StepDefinition>> {
        self.by_name.get(name).map(|&i| Arc::clone(&self.steps[i]))
    }

    /// Step names in registration order
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    /// Number of registered steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// DFS cycle check over the `requires` adjacency
    fn has_cycle(&self) -> bool {
        // 0 = unvisited, 1 = on stack, 2 = done
        let mut state = vec![0u8; self.steps.len()];

        fn visit(registry: &StepRegistry, i: usize, state: &mut [u8]) -> bool {
            match state[i] {
                1 => return true,
                2 => return false,
                _ => {}
            }
            state[i] = 1;
            for dep in registry.steps[i].requires() {
                if let Some(&j) = registry.by_name.get(*dep) {
                    if visit(registry, j, state) {
                        return true;
                    }
                }
            }
            state[i] = 2;
            false
        }

        (0..self.steps.len()).any(|i| visit(self, i, &mut state))
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
