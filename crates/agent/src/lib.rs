//! The agent loop: the heart of Wayfarer.
//!
//! Each step follows an **Observe → Decide → Act → Record** cycle:
//!
//! 1. **Observe** the environment through the [`EnvironmentObserver`]
//! 2. **Consolidate** older steps into memory at interval boundaries
//! 3. **Render** the bounded conversation held by the [`ContextManager`]
//! 4. **Decide** by asking the model, correcting malformed output
//! 5. **Act** by dispatching each action through the registry
//! 6. **Record** the step and evaluate termination
//!
//! The loop continues until the model marks the task done, the step limit
//! is reached, too many steps fail in a row, or a pause or stop signal
//! arrives through [`RunControl`].

pub mod consolidator;
pub mod context;
pub mod control;
pub mod loop_runner;
pub mod observer;
pub mod parser;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use consolidator::{Consolidation, MemoryConsolidator};
pub use context::{AppendReport, ContextManager};
pub use control::{RunControl, RunSignal};
pub use loop_runner::AgentLoop;
pub use observer::EnvironmentObserver;
pub use parser::{DecisionError, extract_json_object, parse_decision};
