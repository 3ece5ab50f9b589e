//! Content extraction.

use std::sync::Arc;

use async_trait::async_trait;
use wayfarer_core::action::{ActionHandler, ActionOutcome, ParamKind, ParamSchema, ValidatedParams};
use wayfarer_core::environment::Environment;
use wayfarer_core::error::ActionError;

use crate::registry::ActionRegistry;

/// Extracted text longer than this is cut before entering the context.
pub const MAX_EXTRACT_CHARS: usize = 20_000;

pub(crate) fn register(registry: &ActionRegistry) -> Result<(), ActionError> {
    registry.register(
        "extract_content",
        "Read the text of the current page to answer a specific goal.",
        ParamSchema::new().required("goal", ParamKind::String, "what to look for"),
        None,
        Arc::new(ExtractContent),
    )
}

pub struct ExtractContent;

#[async_trait]
impl ActionHandler for ExtractContent {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        let goal = params.str("goal").unwrap_or_default();
        let location = env.current_location().await?;
        let text = env.read_content().await?;
        let text = truncate_chars(text.trim(), MAX_EXTRACT_CHARS);

        Ok(ActionOutcome::ok(format!(
            "📄 Extracted from {location} (goal: {goal}):\n{text}"
        ))
        .in_context())
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{} [...]", &text[..cut]),
        None => text.to_string(),
    }
}
