//! Task: the immutable instruction an agent run works toward.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// An instruction plus optional constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,

    /// Short label used in logs and run log file names
    pub name: String,

    pub instruction: String,

    /// Placeholder name → real value. Values are never shown to the model.
    #[serde(default, skip_serializing)]
    pub sensitive_data: BTreeMap<String, String>,

    /// Domains navigation may reach; `None` means unrestricted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
}

impl Task {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: "task".into(),
            instruction: instruction.into(),
            sensitive_data: BTreeMap::new(),
            allowed_domains: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_sensitive_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.sensitive_data = data;
        self
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.sensitive_data.insert(name.into(), value.into());
        self
    }

    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = if domains.is_empty() { None } else { Some(domains) };
        self
    }

    /// Placeholder names the model may reference.
    pub fn secret_names(&self) -> Vec<&str> {
        self.sensitive_data.keys().map(String::as_str).collect()
    }
}
