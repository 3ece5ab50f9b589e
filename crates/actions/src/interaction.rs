//! Element interaction and scrolling.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use wayfarer_core::action::{ActionHandler, ActionOutcome, ParamKind, ParamSchema, ValidatedParams};
use wayfarer_core::environment::{ElementIndex, Environment, InteractionEffect, ScrollDirection};
use wayfarer_core::error::ActionError;

use crate::registry::ActionRegistry;

pub(crate) fn register(registry: &ActionRegistry) -> Result<(), ActionError> {
    registry.register(
        "click_element",
        "Click the element with the given index.",
        ParamSchema::new().required("index", ParamKind::ElementIndex, "element to click"),
        None,
        Arc::new(ClickElement),
    )?;
    registry.register(
        "input_text",
        "Type text into the input element with the given index.",
        ParamSchema::new()
            .required("index", ParamKind::ElementIndex, "element to type into")
            .required("text", ParamKind::String, "text to type"),
        None,
        Arc::new(InputText),
    )?;
    registry.register(
        "scroll_down",
        "Scroll the page down by a number of elements, or one page if omitted.",
        ParamSchema::new().optional("amount", ParamKind::Integer, "elements to scroll"),
        None,
        Arc::new(Scroll(ScrollDirection::Down)),
    )?;
    registry.register(
        "scroll_up",
        "Scroll the page up by a number of elements, or one page if omitted.",
        ParamSchema::new().optional("amount", ParamKind::Integer, "elements to scroll"),
        None,
        Arc::new(Scroll(ScrollDirection::Up)),
    )?;
    Ok(())
}

fn index(params: &ValidatedParams, action: &str) -> Result<ElementIndex, ActionError> {
    params.index("index").ok_or_else(|| ActionError::Validation {
        action: action.into(),
        reason: "missing 'index'".into(),
    })
}

pub struct ClickElement;

#[async_trait]
impl ActionHandler for ClickElement {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        let index = index(params, "click_element")?;
        let effect = env.click(index).await?;
        let message = match &effect {
            InteractionEffect::None => format!("🖱️ Clicked element {index}"),
            InteractionEffect::Navigated { location } => {
                format!("🖱️ Clicked element {index}, now at {location}")
            }
            InteractionEffect::OpenedContext { id } => {
                format!("🖱️ Clicked element {index}, which opened tab {id}")
            }
        };
        info!(%index, "{message}");

        let outcome = ActionOutcome::ok(message).in_context();
        Ok(if effect.invalidates_surface() {
            outcome.interrupting()
        } else {
            outcome
        })
    }
}

pub struct InputText;

#[async_trait]
impl ActionHandler for InputText {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        let index = index(params, "input_text")?;
        let text = params.str("text").unwrap_or_default();
        env.type_text(index, text).await?;
        // The text may be a substituted secret; the registry redacts it.
        Ok(ActionOutcome::ok(format!("⌨️ Input {text} into element {index}")).in_context())
    }
}

pub struct Scroll(pub ScrollDirection);

#[async_trait]
impl ActionHandler for Scroll {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        let amount = match params.int("amount") {
            Some(n) if n <= 0 => {
                return Err(ActionError::Validation {
                    action: format!("scroll_{}", direction_label(self.0)),
                    reason: "amount must be positive".into(),
                });
            }
            Some(n) => Some(u32::try_from(n).unwrap_or(u32::MAX)),
            None => None,
        };
        env.scroll(self.0, amount).await?;

        let by = amount.map_or_else(|| "one page".to_string(), |n| format!("{n} elements"));
        Ok(ActionOutcome::ok(format!("🔍 Scrolled {} by {by}", direction_label(self.0))).in_context())
    }
}

fn direction_label(direction: ScrollDirection) -> &'static str {
    match direction {
        ScrollDirection::Up => "up",
        ScrollDirection::Down => "down",
    }
}
