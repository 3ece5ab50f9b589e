//! Error types for the Wayfarer domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`ErrorKind`] is the
//! structural classification the agent loop branches on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::environment::ElementIndex;

/// The top-level error type for all Wayfarer operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Environment errors ---
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    // --- Action errors ---
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Structural classification of every failure the loop can observe.
///
/// The loop never inspects error messages; it only looks at this kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The environment could not be observed at all. Fatal for the run.
    EnvironmentUnreachable,
    /// The model output could not be parsed into a decision.
    DecisionParseFailure,
    /// Parameters did not match the action's schema. No side effects happened.
    ActionValidationFailure,
    /// The handler ran and reported a failure.
    ActionExecutionFailure,
    /// An element index was absent from the current selector map.
    StaleReference,
    /// The model provider rate-limited the request.
    RateLimited,
    /// Context budget pressure. Degraded mode, never a failure on its own.
    BudgetExceeded,
    /// The action was invoked outside its allowed domains.
    ScopeViolation,
    /// A suspension point exceeded its timeout.
    Timeout,
    /// The model provider failed for a reason other than rate limiting.
    ModelFailure,
}

impl ErrorKind {
    /// Whether this kind ends the run immediately.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::EnvironmentUnreachable)
    }

    /// Whether the model should re-observe before retrying.
    pub fn recommends_reobservation(self) -> bool {
        matches!(self, Self::StaleReference)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::EnvironmentUnreachable => "environment_unreachable",
            Self::DecisionParseFailure => "decision_parse_failure",
            Self::ActionValidationFailure => "action_validation_failure",
            Self::ActionExecutionFailure => "action_execution_failure",
            Self::StaleReference => "stale_reference",
            Self::RateLimited => "rate_limited",
            Self::BudgetExceeded => "budget_exceeded",
            Self::ScopeViolation => "scope_violation",
            Self::Timeout => "timeout",
            Self::ModelFailure => "model_failure",
        };
        f.write_str(label)
    }
}

/// An error carried on an outcome and fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OutcomeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::ModelFailure,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    #[error("Environment unreachable: {0}")]
    Unreachable(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("No element with index {0}")]
    ElementNotFound(ElementIndex),

    #[error("No open context with id {0}")]
    ContextNotFound(u32),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Operation not supported by this environment: {0}")]
    Unsupported(String),
}

impl EnvironmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable(_) => ErrorKind::EnvironmentUnreachable,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ElementNotFound(_) => ErrorKind::StaleReference,
            _ => ErrorKind::ActionExecutionFailure,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid parameters for {action}: {reason}")]
    Validation { action: String, reason: String },

    #[error("Invalid schema for {action}: {reason}")]
    InvalidSchema { action: String, reason: String },

    #[error("Element {index} is not in the current page state; observe again before retrying")]
    StaleReference { index: ElementIndex },

    #[error("Action {action} is not allowed at {location}")]
    Scope { action: String, location: String },

    #[error("Action {action} failed: {reason}")]
    Execution { action: String, reason: String },

    #[error("Action {action} timed out after {after_secs}s")]
    Timeout { action: String, after_secs: u64 },

    #[error("Unknown sensitive-data placeholder: {0}")]
    UnknownSecret(String),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownAction(_)
            | Self::Validation { .. }
            | Self::InvalidSchema { .. }
            | Self::UnknownSecret(_) => ErrorKind::ActionValidationFailure,
            Self::StaleReference { .. } => ErrorKind::StaleReference,
            Self::Scope { .. } => ErrorKind::ScopeViolation,
            Self::Execution { .. } => ErrorKind::ActionExecutionFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Environment(e) => e.kind(),
        }
    }

    /// Convert into the error carried on an outcome.
    pub fn to_outcome_error(&self) -> OutcomeError {
        OutcomeError::new(self.kind(), self.to_string())
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Summarization failed: {0}")]
    Summarization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn rate_limit_is_classified_structurally() {
        let err = ProviderError::RateLimited { retry_after_secs: 5 };
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(
            ProviderError::Network("reset".into()).kind(),
            ErrorKind::ModelFailure
        );
    }

    #[test]
    fn stale_reference_is_distinct_from_validation() {
        let stale = ActionError::StaleReference {
            index: ElementIndex(7),
        };
        let invalid = ActionError::Validation {
            action: "click_element".into(),
            reason: "missing index".into(),
        };
        assert_eq!(stale.kind(), ErrorKind::StaleReference);
        assert_eq!(invalid.kind(), ErrorKind::ActionValidationFailure);
        assert!(stale.kind().recommends_reobservation());
        assert!(!invalid.kind().recommends_reobservation());
    }

    #[test]
    fn only_unreachable_is_fatal() {
        assert!(ErrorKind::EnvironmentUnreachable.is_fatal());
        assert!(!ErrorKind::Timeout.is_fatal());
        assert!(!ErrorKind::BudgetExceeded.is_fatal());
    }

    #[test]
    fn environment_errors_wrap_into_action_errors() {
        let err: ActionError = EnvironmentError::Unreachable("connection refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::EnvironmentUnreachable);
        let outcome = err.to_outcome_error();
        assert!(outcome.message.contains("connection refused"));
    }
}
