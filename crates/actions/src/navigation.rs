//! Navigation and tab actions.
//!
//! Everything here moves the environment to a different surface, so every
//! successful outcome interrupts the rest of the step's action sequence.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use wayfarer_core::action::{ActionHandler, ActionOutcome, ParamKind, ParamSchema, ValidatedParams};
use wayfarer_core::environment::Environment;
use wayfarer_core::error::ActionError;

use crate::registry::ActionRegistry;

pub(crate) fn register(registry: &ActionRegistry) -> Result<(), ActionError> {
    registry.register(
        "go_to_url",
        "Navigate the current tab to a URL.",
        ParamSchema::new().required("url", ParamKind::Url, "address to open"),
        None,
        Arc::new(GoToUrl),
    )?;
    registry.register(
        "go_back",
        "Go back to the previous page in the current tab.",
        ParamSchema::new(),
        None,
        Arc::new(GoBack),
    )?;
    registry.register(
        "open_tab",
        "Open a URL in a new tab and switch to it.",
        ParamSchema::new().required("url", ParamKind::Url, "address to open"),
        None,
        Arc::new(OpenTab),
    )?;
    registry.register(
        "switch_tab",
        "Switch to an open tab by id.",
        ParamSchema::new().required("tab_id", ParamKind::Integer, "id from the open tabs list"),
        None,
        Arc::new(SwitchTab),
    )?;
    registry.register(
        "close_tab",
        "Close an open tab by id.",
        ParamSchema::new().required("tab_id", ParamKind::Integer, "id from the open tabs list"),
        None,
        Arc::new(CloseTab),
    )?;
    Ok(())
}

fn required_str<'a>(params: &'a ValidatedParams, action: &str, name: &str) -> Result<&'a str, ActionError> {
    params.str(name).ok_or_else(|| ActionError::Validation {
        action: action.into(),
        reason: format!("missing '{name}'"),
    })
}

fn tab_id(params: &ValidatedParams, action: &str) -> Result<u32, ActionError> {
    params
        .int("tab_id")
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ActionError::Validation {
            action: action.into(),
            reason: "tab_id must be a non-negative integer".into(),
        })
}

pub struct GoToUrl;

#[async_trait]
impl ActionHandler for GoToUrl {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        let url = required_str(params, "go_to_url", "url")?;
        env.navigate(url).await?;
        info!(url, "🔗 Navigated");
        Ok(ActionOutcome::ok(format!("🔗 Navigated to {url}"))
            .in_context()
            .interrupting())
    }
}

pub struct GoBack;

#[async_trait]
impl ActionHandler for GoBack {
    async fn invoke(
        &self,
        _params: &ValidatedParams,
        env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        env.go_back().await?;
        let location = env.current_location().await?;
        Ok(ActionOutcome::ok(format!("🔙 Navigated back to {location}"))
            .in_context()
            .interrupting())
    }
}

pub struct OpenTab;

#[async_trait]
impl ActionHandler for OpenTab {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        let url = required_str(params, "open_tab", "url")?;
        let id = env.open_context(url).await?;
        Ok(ActionOutcome::ok(format!("🔗 Opened tab {id} with {url}"))
            .in_context()
            .interrupting())
    }
}

pub struct SwitchTab;

#[async_trait]
impl ActionHandler for SwitchTab {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        let id = tab_id(params, "switch_tab")?;
        env.switch_context(id).await?;
        Ok(ActionOutcome::ok(format!("🔄 Switched to tab {id}"))
            .in_context()
            .interrupting())
    }
}

pub struct CloseTab;

#[async_trait]
impl ActionHandler for CloseTab {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        let id = tab_id(params, "close_tab")?;
        env.close_context(id).await?;
        Ok(ActionOutcome::ok(format!("❌ Closed tab {id}"))
            .in_context()
            .interrupting())
    }
}
