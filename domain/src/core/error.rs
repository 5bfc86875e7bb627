//! Domain error types

use thiserror::Error;

/// Domain-level errors
///
/// Raised synchronously when an entity invariant would be broken. These are
/// never persisted; the application layer maps them to validation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("{field} must be within [0, 1], got {value}")]
    ScoreOutOfRange { field: &'static str, value: f64 },

    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{entity} is in terminal state {status} and can no longer change")]
    AlreadyTerminal { entity: &'static str, status: String },

    #[error("Override has already been applied")]
    OverrideAlreadyApplied,

    #[error("No tools available for orchestration")]
    NoToolsAvailable,

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl DomainError {
    /// Check if this error comes from a state machine rejecting a move
    pub fn is_transition_error(&self) -> bool {
        matches!(
            self,
            DomainError::InvalidTransition { .. } | DomainError::AlreadyTerminal { .. }
        )
    }
}
