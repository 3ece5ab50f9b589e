//! Prompt text: the system instruction, per-step state descriptions and
//! outcome summaries.

use wayfarer_core::action::ActionOutcome;
use wayfarer_core::environment::EnvironmentSnapshot;
use wayfarer_core::task::Task;

/// Longest element text shown in a state description.
const MAX_ELEMENT_TEXT: usize = 80;

/// Longest outcome text fed back per action.
const MAX_OUTCOME_CHARS: usize = 4_000;

pub const CORRECTION: &str = "Your last response could not be used. Respond only with a single JSON object \
in the required format: {\"current_state\": {\"evaluation_previous_goal\": ..., \"memory\": ..., \
\"next_goal\": ...}, \"action\": [{\"action_name\": {...params}}]}. Use only the listed actions.";

const SYSTEM_RULES: &str = r#"You are a precise browser automation agent. You complete the user's task by interacting with a website one step at a time.

## Input
Each step you receive the current page: its URL, title, open tabs and the interactive elements, listed as
[index]<tag attributes>text</tag>
Only elements with an [index] can be used. Elements marked with * appeared since the previous step.
Indices change whenever the page changes: only use indices from the latest state.

## Response format
Respond with exactly one JSON object and nothing else:
{"current_state": {"evaluation_previous_goal": "Success|Failed|Unknown - short assessment of the last step",
                   "memory": "what has been done and what to remember",
                   "next_goal": "what the next actions should achieve"},
 "action": [{"action_name": {"parameter": "value"}}]}

## Rules
- Use up to {max_actions} actions per step. They run in order; the sequence stops early when the page changes.
- Fill form fields before clicking submit. Navigate directly when you know the URL.
- If an action fails, look at the new state before trying again.
- Call done as the only action once the task is complete, or when it cannot be completed. Set success to false if you did not finish."#;

/// The permanent instruction: rules, actions, secrets and the task.
pub fn system_prompt(task: &Task, actions: &str, max_actions: usize, use_vision: bool) -> String {
    let mut prompt = SYSTEM_RULES.replace("{max_actions}", &max_actions.to_string());

    if use_vision {
        prompt.push_str(
            "\n- When a screenshot is attached, trust it over the element list if they disagree.",
        );
    }

    prompt.push_str("\n\n## Available actions\n");
    prompt.push_str(actions);

    let secrets = task.secret_names();
    if !secrets.is_empty() {
        prompt.push_str("\n\n## Sensitive data\nThese placeholders stand for values you cannot see. ");
        prompt.push_str("Write <secret>name</secret> in action parameters to use them:\n");
        for name in secrets {
            prompt.push_str(&format!("- {name}\n"));
        }
    }

    if let Some(domains) = &task.allowed_domains {
        prompt.push_str(&format!(
            "\n\n## Allowed domains\nNavigation is restricted to: {}",
            domains.join(", ")
        ));
    }

    prompt.push_str("\n\n## Task\n");
    prompt.push_str(&task.instruction);
    prompt
}

/// Describe the current snapshot for the next decision.
pub fn state_description(snapshot: &EnvironmentSnapshot, step: u32, max_steps: u32) -> String {
    let mut out = format!("## Current state (step {} of {max_steps})\n", step + 1);
    out.push_str(&format!("URL: {}\n", snapshot.location));
    if !snapshot.title.is_empty() {
        out.push_str(&format!("Title: {}\n", snapshot.title));
    }
    if snapshot.stale {
        out.push_str("Note: the page had not finished loading; this state may be outdated.\n");
    }

    if snapshot.contexts.len() > 1 {
        out.push_str("Open tabs:\n");
        for tab in &snapshot.contexts {
            let marker = if tab.active { " (active)" } else { "" };
            out.push_str(&format!("  [{}] {} - {}{marker}\n", tab.id, tab.title, tab.location));
        }
    }

    out.push_str("\nInteractive elements:\n");
    if snapshot.elements_above > 0 {
        out.push_str(&format!(
            "... {} elements above - scroll up to see them ...\n",
            snapshot.elements_above
        ));
    } else {
        out.push_str("[Start of page]\n");
    }

    if snapshot.elements.is_empty() {
        out.push_str("(no interactive elements)\n");
    }
    for element in &snapshot.elements {
        let new = if element.is_new { "*" } else { "" };
        let attributes: String = element
            .attributes
            .iter()
            .map(|(k, v)| format!(" {k}=\"{}\"", shorten(v, MAX_ELEMENT_TEXT)))
            .collect();
        out.push_str(&format!(
            "{new}[{}]<{}{attributes}>{}</{}>\n",
            element.index,
            element.tag,
            shorten(&element.text, MAX_ELEMENT_TEXT),
            element.tag
        ));
    }

    if snapshot.elements_below > 0 {
        out.push_str(&format!(
            "... {} elements below - scroll down to see them ...\n",
            snapshot.elements_below
        ));
    } else {
        out.push_str("[End of page]\n");
    }
    out
}

/// Summarize a step's outcomes for the model. Returns `None` when nothing
/// is worth feeding back.
pub fn outcome_summary(step: u32, location: &str, outcomes: &[ActionOutcome]) -> Option<String> {
    let lines: Vec<String> = outcomes
        .iter()
        .filter_map(|o| match &o.error {
            Some(error) => Some(format!(
                "Action {} failed ({}): {}",
                o.action,
                error.kind,
                shorten(&error.message, MAX_OUTCOME_CHARS)
            )),
            None if o.include_in_context => o.content.as_deref().map(|content| {
                format!(
                    "Action {} result: {}",
                    o.action,
                    shorten(content, MAX_OUTCOME_CHARS)
                )
            }),
            None => None,
        })
        .collect();

    if lines.is_empty() {
        return None;
    }
    Some(format!("📍 Step {step} at {location}\n{}", lines.join("\n")))
}

fn shorten(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_core::environment::{AddressableElement, ContextInfo};
    use wayfarer_core::error::ErrorKind;

    #[test]
    fn system_prompt_lists_secret_names_only() {
        let task = Task::new("Log in").with_secret("password", "hunter2");
        let prompt = system_prompt(&task, "- done: finish", 4, false);
        assert!(prompt.contains("Use up to 4 actions"));
        assert!(prompt.contains("- password"));
        assert!(!prompt.contains("hunter2"));
        assert!(prompt.ends_with("## Task\nLog in"));
        assert!(!prompt.contains("screenshot"));
    }

    #[test]
    fn state_marks_new_elements_and_scroll_hints() {
        let mut fresh = AddressableElement::new(2, "button", "Buy").with_attribute("type", "submit");
        fresh.is_new = true;
        let mut snapshot = EnvironmentSnapshot::new("https://shop.test/", "Shop")
            .with_elements(vec![AddressableElement::new(1, "a", "Home"), fresh]);
        snapshot.elements_below = 7;
        snapshot.contexts = vec![
            ContextInfo {
                id: 1,
                location: "https://shop.test/".into(),
                title: "Shop".into(),
                active: true,
            },
            ContextInfo {
                id: 2,
                location: "https://help.test/".into(),
                title: "Help".into(),
                active: false,
            },
        ];

        let text = state_description(&snapshot, 0, 10);
        assert!(text.contains("step 1 of 10"));
        assert!(text.contains("[1]<a>Home</a>"));
        assert!(text.contains("*[2]<button type=\"submit\">Buy</button>"));
        assert!(text.contains("[Start of page]"));
        assert!(text.contains("7 elements below"));
        assert!(text.contains("[1] Shop - https://shop.test/ (active)"));
    }

    #[test]
    fn outcome_summary_keeps_errors_and_context_results() {
        let outcomes = vec![
            ActionOutcome::ok("clicked").for_action("click_element"),
            ActionOutcome::ok("Prices: $5").in_context().for_action("extract_content"),
            ActionOutcome::failure(ErrorKind::StaleReference, "gone").for_action("click_element"),
        ];
        let text = outcome_summary(3, "https://shop.test/", &outcomes).unwrap();
        assert!(!text.contains("clicked"));
        assert!(text.contains("Prices: $5"));
        assert!(text.contains("failed (stale_reference): gone"));

        let quiet = vec![ActionOutcome::ok("clicked")];
        assert!(outcome_summary(0, "about:blank", &quiet).is_none());
    }
}
