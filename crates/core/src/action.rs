//! Action types: the named operations the agent may invoke.
//!
//! Every action declares a [`ParamSchema`]. Raw model-supplied parameters are
//! validated into [`ValidatedParams`] before a handler ever sees them, so the
//! presence of an element index is a property of the schema, not something a
//! handler probes for at runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::environment::{ElementIndex, Environment};
use crate::error::{ActionError, ErrorKind, OutcomeError};

/// The type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    /// An addressable element index, re-validated at dispatch time
    ElementIndex,
    /// A navigation target, checked against the task's allowed domains
    Url,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            Self::String | Self::Url => "string",
            Self::Integer | Self::ElementIndex => "integer",
            Self::Boolean => "boolean",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// The declared parameter list of an action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSchema {
    pub params: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
        });
        self
    }

    pub fn optional(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: false,
            description: description.into(),
        });
        self
    }

    /// Check the schema itself. Called once at registration.
    pub fn validate_definition(&self, action: &str) -> Result<(), ActionError> {
        let mut seen = HashSet::new();
        for spec in &self.params {
            if spec.name.trim().is_empty() {
                return Err(ActionError::InvalidSchema {
                    action: action.into(),
                    reason: "parameter with empty name".into(),
                });
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ActionError::InvalidSchema {
                    action: action.into(),
                    reason: format!("duplicate parameter '{}'", spec.name),
                });
            }
        }
        Ok(())
    }

    /// Names of the parameters that carry element indices.
    pub fn index_params(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| p.kind == ParamKind::ElementIndex)
            .map(|p| p.name.as_str())
    }

    /// Names of the parameters that carry navigation targets.
    pub fn url_params(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| p.kind == ParamKind::Url)
            .map(|p| p.name.as_str())
    }

    /// Validate raw parameters against this schema.
    ///
    /// Unknown keys, missing required keys and type mismatches are all
    /// rejected. `null` for an optional parameter counts as absent.
    pub fn validate(
        &self,
        action: &str,
        raw: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ValidatedParams, ActionError> {
        let invalid = |reason: String| ActionError::Validation {
            action: action.into(),
            reason,
        };

        for key in raw.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                return Err(invalid(format!("unknown parameter '{key}'")));
            }
        }

        let mut values = BTreeMap::new();
        for spec in &self.params {
            let value = match raw.get(&spec.name) {
                None | Some(serde_json::Value::Null) => {
                    if spec.required {
                        return Err(invalid(format!("missing required parameter '{}'", spec.name)));
                    }
                    continue;
                }
                Some(v) => v,
            };
            let converted = convert(spec, value).ok_or_else(|| {
                invalid(format!(
                    "parameter '{}' must be {}, got {}",
                    spec.name,
                    describe_kind(spec.kind),
                    value
                ))
            })?;
            values.insert(spec.name.clone(), converted);
        }

        Ok(ValidatedParams { values })
    }

    /// JSON Schema object, used in the action catalog shown to the model.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for spec in &self.params {
            let mut prop = serde_json::json!({ "type": spec.kind.json_type() });
            if !spec.description.is_empty() {
                prop["description"] = serde_json::Value::String(spec.description.clone());
            }
            properties.insert(spec.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn describe_kind(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::String => "a string",
        ParamKind::Integer => "an integer",
        ParamKind::Boolean => "a boolean",
        ParamKind::ElementIndex => "a non-negative element index",
        ParamKind::Url => "a non-empty URL",
    }
}

fn convert(spec: &ParamSpec, value: &serde_json::Value) -> Option<ParamValue> {
    match spec.kind {
        ParamKind::String => value.as_str().map(|s| ParamValue::Str(s.to_string())),
        ParamKind::Integer => value.as_i64().map(ParamValue::Int),
        ParamKind::Boolean => value.as_bool().map(ParamValue::Bool),
        ParamKind::Url => value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| ParamValue::Str(s.to_string())),
        ParamKind::ElementIndex => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(|n| ParamValue::Index(ElementIndex(n))),
    }
}

/// A validated parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Index(ElementIndex),
}

/// Parameters that passed schema validation. Handlers only ever see these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedParams {
    values: BTreeMap<String, ParamValue>,
}

impl ValidatedParams {
    pub fn str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ParamValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn index(&self, name: &str) -> Option<ElementIndex> {
        match self.values.get(name) {
            Some(ParamValue::Index(i)) => Some(*i),
            _ => None,
        }
    }

    /// Every element index carried by these parameters.
    pub fn element_indices(&self) -> Vec<ElementIndex> {
        self.values
            .values()
            .filter_map(|v| match v {
                ParamValue::Index(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    /// Replace a string value. Does nothing if `name` is not a string.
    pub fn replace_str(&mut self, name: &str, value: String) {
        if let Some(ParamValue::Str(s)) = self.values.get_mut(name) {
            *s = value;
        }
    }

    /// Rewrite every string value in place.
    pub fn map_strings<F>(&mut self, mut f: F) -> Result<(), ActionError>
    where
        F: FnMut(&str) -> Result<String, ActionError>,
    {
        for value in self.values.values_mut() {
            if let ParamValue::Str(s) = value {
                *s = f(s)?;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The result of one dispatched action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Name of the action that produced this outcome
    #[serde(default)]
    pub action: String,

    /// Extracted content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,

    /// Feed `content` into the model's context verbatim
    #[serde(default)]
    pub include_in_context: bool,

    /// Stop issuing the remaining invocations of this step
    #[serde(default)]
    pub interrupts_sequence: bool,

    #[serde(default)]
    pub is_done: bool,

    /// Self-reported success, only meaningful when `is_done`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl ActionOutcome {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: Some(OutcomeError::new(kind, message)),
            ..Self::default()
        }
    }

    pub fn done(text: impl Into<String>, success: bool) -> Self {
        Self {
            content: Some(text.into()),
            include_in_context: true,
            is_done: true,
            success: Some(success),
            ..Self::default()
        }
    }

    pub fn in_context(mut self) -> Self {
        self.include_in_context = true;
        self
    }

    pub fn interrupting(mut self) -> Self {
        self.interrupts_sequence = true;
        self
    }

    pub fn for_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

impl From<ActionError> for ActionOutcome {
    fn from(err: ActionError) -> Self {
        Self {
            error: Some(err.to_outcome_error()),
            ..Self::default()
        }
    }
}

/// The handler half of a registered action.
///
/// Handlers get exactly the validated parameters and the environment handle.
/// Any error they return is caught by the registry and turned into an outcome.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        env: &mut dyn Environment,
    ) -> std::result::Result<ActionOutcome, ActionError>;
}
