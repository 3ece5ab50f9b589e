//! # Wayfarer Core
//!
//! Domain types, traits, and error definitions for the Wayfarer task-execution
//! agent. This crate has **zero framework dependencies**: it defines the domain
//! model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the agent loop talks to is defined as a trait here:
//! - [`Environment`]: the stateful surface the agent perceives and drives
//! - [`Provider`]: the model that decides what to do next
//! - [`MemoryStore`]: the durable home of consolidated summaries
//! - [`ActionHandler`]: one named operation the agent may invoke
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted providers and in-memory environments.

pub mod action;
pub mod conversation;
pub mod decision;
pub mod environment;
pub mod error;
pub mod event;
pub mod memory;
pub mod provider;
pub mod run;
pub mod task;

// Re-export key types at crate root for ergonomics
pub use action::{
    ActionHandler, ActionOutcome, ParamKind, ParamSchema, ParamSpec, ParamValue, ValidatedParams,
};
pub use conversation::{ConversationEntry, EntryKind, Role};
pub use decision::{ActionInvocation, Decision};
pub use environment::{
    AddressableElement, CaptureOptions, ContextInfo, ElementIndex, Environment,
    EnvironmentSnapshot, InteractionEffect, ScrollDirection, SelectorMap, SnapshotSummary,
    VisualReference,
};
pub use error::{Error, ErrorKind, OutcomeError, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryRecord, MemoryStore, StepRange};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use run::{AgentSettings, RunResult, RunState, RunStatus, StepRecord};
pub use task::Task;
