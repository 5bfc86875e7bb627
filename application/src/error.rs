//! Engine error taxonomy
//!
//! Every use case returns [`EngineError`]. Port errors convert into it so use
//! cases can propagate with `?`.

use crate::ports::document_service::DocumentError;
use crate::ports::llm_gateway::GatewayError;
use crate::ports::provenance_ledger::LedgerError;
use crate::ports::repository::RepositoryError;
use crate::ports::tool_invoker::ToolInvocationError;
use semantra_domain::DomainError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// An LLM or tool call failed after its retries.
    #[error("External call failed: {0}")]
    ExternalCallFailure(String),

    /// Rejected input or an illegal transition. Never persisted.
    #[error("Validation failed: {0}")]
    Validation(#[from] DomainError),

    #[error("Lost optimistic update race on {entity} after {attempts} attempts")]
    ConcurrencyConflict { entity: String, attempts: u32 },

    /// A row without a resolvable generation record.
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::Validation(DomainError::InvalidValue(message.into()))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Validation(_) | EngineError::NotFound { .. } => 2,
            EngineError::ExternalCallFailure(_) => 3,
            EngineError::ConcurrencyConflict { .. } => 4,
            EngineError::ConsistencyViolation(_) => 5,
            EngineError::Cancelled => 130,
            EngineError::Storage(_) | EngineError::Internal(_) => 1,
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound { kind, id } => EngineError::NotFound { kind, id },
            RepositoryError::Duplicate { kind, id } => {
                EngineError::invalid(format!("{kind} already exists: {id}"))
            }
            RepositoryError::VersionConflict { id, .. } => EngineError::ConcurrencyConflict {
                entity: id,
                attempts: 1,
            },
            RepositoryError::Storage(msg) => EngineError::Storage(msg),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::UnknownActivity(id) => {
                EngineError::ConsistencyViolation(format!("entity generated by unknown activity {id}"))
            }
            LedgerError::WriteFailed(msg) => EngineError::Storage(msg),
        }
    }
}

impl From<GatewayError> for EngineError {
    fn from(e: GatewayError) -> Self {
        EngineError::ExternalCallFailure(e.to_string())
    }
}

impl From<ToolInvocationError> for EngineError {
    fn from(e: ToolInvocationError) -> Self {
        EngineError::ExternalCallFailure(e.to_string())
    }
}

impl From<DocumentError> for EngineError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::NotFound(id) => EngineError::not_found("document", id),
            DocumentError::Unavailable(msg) => EngineError::ExternalCallFailure(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_are_validation() {
        let err: EngineError = DomainError::OverrideAlreadyApplied.into();
        assert!(err.is_validation());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_repository_conversion() {
        let err: EngineError = RepositoryError::not_found("decision", "dec-1").into();
        assert_eq!(err, EngineError::not_found("decision", "dec-1"));

        let err: EngineError = RepositoryError::VersionConflict {
            id: "pat-1".into(),
            expected: 2,
            actual: 3,
        }
        .into();
        assert!(matches!(err, EngineError::ConcurrencyConflict { .. }));
    }

    #[test]
    fn test_unknown_activity_is_consistency_violation() {
        let err: EngineError = LedgerError::UnknownActivity("act-x".into()).into();
        assert!(matches!(err, EngineError::ConsistencyViolation(_)));
    }
}
