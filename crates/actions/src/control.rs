//! Flow-control actions: waiting and finishing the task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wayfarer_core::action::{ActionHandler, ActionOutcome, ParamKind, ParamSchema, ValidatedParams};
use wayfarer_core::environment::Environment;
use wayfarer_core::error::ActionError;

use crate::registry::ActionRegistry;

const DEFAULT_WAIT_SECS: i64 = 3;
const MAX_WAIT_SECS: i64 = 30;

pub(crate) fn register(registry: &ActionRegistry) -> Result<(), ActionError> {
    registry.register(
        "wait",
        "Wait for the page to finish loading.",
        ParamSchema::new().optional("seconds", ParamKind::Integer, "seconds to wait (default 3)"),
        None,
        Arc::new(Wait),
    )?;
    registry.register(
        "done",
        "Finish the task. Put the final answer in text and say whether the task succeeded.",
        ParamSchema::new()
            .required("text", ParamKind::String, "final answer or report")
            .optional("success", ParamKind::Boolean, "whether the task succeeded (default true)"),
        None,
        Arc::new(Done),
    )?;
    Ok(())
}

pub struct Wait;

#[async_trait]
impl ActionHandler for Wait {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        _env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        let seconds = params
            .int("seconds")
            .unwrap_or(DEFAULT_WAIT_SECS)
            .clamp(0, MAX_WAIT_SECS);
        tokio::time::sleep(Duration::from_secs(seconds as u64)).await;
        Ok(ActionOutcome::ok(format!("🕒 Waited for {seconds} seconds")).in_context())
    }
}

pub struct Done;

#[async_trait]
impl ActionHandler for Done {
    async fn invoke(
        &self,
        params: &ValidatedParams,
        _env: &mut dyn Environment,
    ) -> Result<ActionOutcome, ActionError> {
        let text = params.str("text").unwrap_or_default();
        let success = params.bool("success").unwrap_or(true);
        Ok(ActionOutcome::done(text, success))
    }
}
