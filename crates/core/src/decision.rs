//! Decision types: the model's structured choice of what to do next.

use serde::{Deserialize, Serialize};

/// One requested action: a name plus raw, not yet validated, parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInvocation {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ActionInvocation {
    pub fn new(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for ActionInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({})",
            self.name,
            serde_json::Value::Object(self.params.clone())
        )
    }
}

/// The model's output for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Self-assessment of the previous goal
    pub evaluation_previous_goal: String,

    /// Free-text working memory
    pub memory: String,

    pub next_goal: String,

    /// Ordered, between 1 and `max_actions_per_step`
    pub actions: Vec<ActionInvocation>,
}

impl Decision {
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }
}
