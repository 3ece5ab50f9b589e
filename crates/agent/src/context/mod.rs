//! Conversation context for the model.
//!
//! [`ContextManager`] owns the budgeted conversation; [`prompt`] renders
//! the text that goes into it.

pub mod manager;
pub mod prompt;

pub use manager::{AppendReport, ContextManager};
