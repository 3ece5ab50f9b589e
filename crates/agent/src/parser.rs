//! Turning free model text into a [`Decision`].
//!
//! Models wrap JSON in prose or code fences, nest the reasoning fields
//! under `current_state`, and spell actions either as `{"click_element":
//! {"index": 3}}` or `{"action": "click_element", "index": 3}`. All of
//! those are accepted; anything else is a parse failure the loop retries.

use serde_json::{Map, Value};
use tracing::warn;
use wayfarer_actions::Catalog;
use wayfarer_core::decision::{ActionInvocation, Decision};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    #[error("response was empty")]
    Empty,

    #[error("response contains no JSON object")]
    NoJson,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("field `{0}` must be a string")]
    InvalidField(&'static str),

    #[error("response has no `action` list")]
    MissingActions,

    #[error("action list is empty")]
    NoActions,

    #[error("action #{position} is malformed: {reason}")]
    MalformedAction { position: usize, reason: String },

    #[error("unknown action `{0}`")]
    UnknownAction(String),
}

/// Parse and structurally validate model output.
///
/// Invocations beyond `max_actions` are dropped with a warning.
pub fn parse_decision(raw: &str, catalog: &Catalog, max_actions: usize) -> Result<Decision, DecisionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecisionError::Empty);
    }

    let candidate = extract_json_object(trimmed).ok_or(DecisionError::NoJson)?;
    let value: Value = serde_json::from_str(&candidate).map_err(|e| DecisionError::InvalidJson(e.to_string()))?;
    let Value::Object(root) = value else {
        return Err(DecisionError::NoJson);
    };

    let state = match root.get("current_state") {
        Some(Value::Object(state)) => state,
        _ => &root,
    };
    let evaluation_previous_goal = string_field(state, "evaluation_previous_goal")?;
    let memory = string_field(state, "memory")?;
    let next_goal = string_field(state, "next_goal")?;

    let items = match root.get("action").or_else(|| root.get("actions")) {
        Some(Value::Array(items)) => items,
        Some(Value::Object(_)) => return Err(DecisionError::MalformedAction {
            position: 1,
            reason: "`action` must be a list".into(),
        }),
        _ => return Err(DecisionError::MissingActions),
    };
    if items.is_empty() {
        return Err(DecisionError::NoActions);
    }

    let mut actions = Vec::with_capacity(items.len().min(max_actions));
    for (i, item) in items.iter().enumerate() {
        let invocation = parse_invocation(i + 1, item)?;
        if catalog.get(&invocation.name).is_none() {
            return Err(DecisionError::UnknownAction(invocation.name));
        }
        actions.push(invocation);
    }

    if actions.len() > max_actions {
        warn!(
            requested = actions.len(),
            max_actions, "Decision has too many actions, truncating"
        );
        actions.truncate(max_actions);
    }

    Ok(Decision {
        evaluation_previous_goal,
        memory,
        next_goal,
        actions,
    })
}

fn string_field(map: &Map<String, Value>, name: &'static str) -> Result<String, DecisionError> {
    match map.get(name) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DecisionError::InvalidField(name)),
    }
}

fn parse_invocation(position: usize, item: &Value) -> Result<ActionInvocation, DecisionError> {
    let malformed = |reason: &str| DecisionError::MalformedAction {
        position,
        reason: reason.into(),
    };
    let Value::Object(map) = item else {
        return Err(malformed("expected an object"));
    };

    // {"action": "name", ...params} or {"name": "name", "params": {...}}
    if let Some(Value::String(name)) = map.get("action").or_else(|| map.get("name")) {
        let params = match map.get("params") {
            Some(Value::Object(params)) => params.clone(),
            Some(_) => return Err(malformed("`params` must be an object")),
            None => map
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "action" | "name"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        return Ok(ActionInvocation {
            name: name.clone(),
            params,
        });
    }

    // {"name": {...params}}
    let mut entries = map.iter();
    match (entries.next(), entries.next()) {
        (Some((name, Value::Object(params))), None) => Ok(ActionInvocation {
            name: name.clone(),
            params: params.clone(),
        }),
        (Some((name, Value::Null)), None) => Ok(ActionInvocation {
            name: name.clone(),
            params: Map::new(),
        }),
        (Some(_), None) => Err(malformed("parameters must be an object")),
        (None, _) => Err(malformed("empty action object")),
        (Some(_), Some(_)) => Err(malformed("expected exactly one action name")),
    }
}

/// Find the JSON object in a model response: a leading object, a fenced
/// block, or the first balanced `{...}` span. Text after the object is
/// ignored.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        // Unbalanced: serde reports where it breaks.
        return Some(balanced_object(raw).unwrap_or(raw).to_string());
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = after_lang[..end].trim();
            if block.starts_with('{') {
                return Some(block.to_string());
            }
        }
    }

    balanced_object(raw).map(str::to_string)
}

/// The first `{...}` span whose braces balance, skipping braces inside
/// string literals.
fn balanced_object(raw: &str) -> Option<&str> {
    let open = raw.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in raw[open..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[open..=open + idx]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_actions::default_registry;

    fn catalog() -> std::sync::Arc<Catalog> {
        default_registry().catalog()
    }

    #[test]
    fn nested_current_state_format() {
        let raw = r#"{
            "current_state": {"evaluation_previous_goal": "Success", "memory": "on home", "next_goal": "log in"},
            "action": [{"click_element": {"index": 3}}, {"input_text": {"index": 4, "text": "alice"}}]
        }"#;
        let decision = parse_decision(raw, &catalog(), 10).unwrap();
        assert_eq!(decision.next_goal, "log in");
        assert_eq!(decision.action_names(), vec!["click_element", "input_text"]);
        assert_eq!(decision.actions[0].params["index"], 3);
    }

    #[test]
    fn flat_format_with_tagged_actions() {
        let raw = r#"Sure! ```json
        {"evaluation_previous_goal": "", "memory": "", "next_goal": "go",
         "actions": [{"action": "go_to_url", "url": "example.com"}, {"name": "go_back"}]}
        ```"#;
        let decision = parse_decision(raw, &catalog(), 10).unwrap();
        assert_eq!(decision.action_names(), vec!["go_to_url", "go_back"]);
        assert_eq!(decision.actions[0].params["url"], "example.com");
        assert!(decision.actions[1].params.is_empty());
    }

    #[test]
    fn extracts_object_from_prose_with_braces_in_strings() {
        let raw = r#"I will do this: {"next_goal": "type }", "action": [{"done": {"text": "ok {x}"}}]} thanks"#;
        let decision = parse_decision(raw, &catalog(), 10).unwrap();
        assert_eq!(decision.next_goal, "type }");
        assert_eq!(decision.actions[0].params["text"], "ok {x}");
    }

    #[test]
    fn trailing_prose_after_object_is_ignored() {
        let raw = "{\"next_goal\":\"x\",\"action\":[{\"go_back\":{}}]}\nThis will go back.";
        let decision = parse_decision(raw, &catalog(), 10).unwrap();
        assert_eq!(decision.next_goal, "x");
        assert_eq!(decision.action_names(), vec!["go_back"]);
    }

    #[test]
    fn too_many_actions_are_truncated() {
        let raw = r#"{"action": [{"go_back": {}}, {"go_back": {}}, {"go_back": {}}]}"#;
        let decision = parse_decision(raw, &catalog(), 2).unwrap();
        assert_eq!(decision.actions.len(), 2);
    }

    #[test]
    fn failures_are_classified() {
        let c = catalog();
        assert_eq!(parse_decision("   ", &c, 10), Err(DecisionError::Empty));
        assert_eq!(parse_decision("I clicked it", &c, 10), Err(DecisionError::NoJson));
        assert!(matches!(parse_decision("{not json}", &c, 10), Err(DecisionError::InvalidJson(_))));
        assert_eq!(parse_decision(r#"{"next_goal": "x"}"#, &c, 10), Err(DecisionError::MissingActions));
        assert_eq!(parse_decision(r#"{"action": []}"#, &c, 10), Err(DecisionError::NoActions));
        assert_eq!(
            parse_decision(r#"{"action": [{"fly": {}}]}"#, &c, 10),
            Err(DecisionError::UnknownAction("fly".into()))
        );
        assert!(matches!(
            parse_decision(r#"{"action": [{"go_back": {}, "done": {}}]}"#, &c, 10),
            Err(DecisionError::MalformedAction { position: 1, .. })
        ));
        assert_eq!(
            parse_decision(r#"{"memory": 4, "action": [{"go_back": {}}]}"#, &c, 10),
            Err(DecisionError::InvalidField("memory"))
        );
    }

    #[test]
    fn extract_returns_none_without_braces() {
        assert!(extract_json_object("no braces here").is_none());
        assert!(extract_json_object("unbalanced { here").is_none());
    }
}
