//! Application layer for semantra
//!
//! This crate contains use cases, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod engine;
pub mod error;
pub mod ports;
pub mod use_cases;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{EngineConfig, ExecutionParams, ModelSelection};
pub use engine::{Engine, EngineDeps};
pub use error::EngineError;
pub use ports::{
    document_service::{DocumentError, DocumentService},
    llm_gateway::{GatewayError, LlmGateway, LlmSession},
    progress::{ExperimentProgress, NoProgress},
    provenance_ledger::{LedgerError, ProvenanceLedger},
    repository::{
        AgentRepository, ConsensusRepository, DecisionFilter, DecisionRepository,
        ExperimentRepository, FeedbackRepository, OverrideRepository, PatternRepository,
        RepositoryError, ToolExecutionRepository,
    },
    tool_invoker::{ToolInvocationError, ToolInvoker, ToolOutput, ToolRequest},
};
pub use use_cases::feedback::FeedbackCollector;
pub use use_cases::orchestrator::{DecisionOrchestrator, ProposeInput};
pub use use_cases::overrides::{AppliedOverride, OverrideManager, OverrideRequest};
pub use use_cases::pattern_learner::{LearningHandle, LearningOutcome, PatternLearner};
pub use use_cases::run_experiment::{ExperimentRequest, ExperimentRunner};
pub use use_cases::shared::Stores;
