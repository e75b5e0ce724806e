use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One browser action in a task plan, e.g. `navigate`, `click`, `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Step {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Ordered sequence of browser actions produced by a plan generator.
/// An immutable value returned to exactly one requester.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub steps: Vec<Step>,
}

impl TaskPlan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    /// Steps may be empty, but every action must be a non-empty string.
    pub fn validate(&self) -> Result<(), String> {
        for (idx, step) in self.steps.iter().enumerate() {
            if step.action.trim().is_empty() {
                return Err(format!("step {idx} has an empty action"));
            }
        }
        Ok(())
    }
}
