//! Domain layer for semantra
//!
//! This crate contains the core business logic, entities, and value objects.
//! It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Decisions
//!
//! A [`Decision`] records which NLP tools, embedding model and processing
//! strategy the engine chose for one document, with a confidence score and
//! the factor breakdown behind it. Each tool run is a [`ToolExecution`].
//!
//! ## Human loop
//!
//! Researchers react to terminal decisions with [`Feedback`] or correct them
//! with a [`DecisionOverride`].
//!
//! ## Learning and consensus
//!
//! - **Patterns**: feedback and overrides are folded into
//!   [`LearningPattern`]s keyed by a [`ContextSignature`]
//! - **Consensus**: several models' proposals are reconciled into one
//!   [`ConsensusVerdict`]
//!
//! ## Provenance
//!
//! Every persisted row carries a [`ProvenanceLink`] to the activity that
//! generated it.

pub mod agent;
pub mod config;
pub mod consensus;
pub mod core;
pub mod decision;
pub mod experiment;
pub mod feedback;
pub mod learning;
pub mod overrides;
pub mod prompt;
pub mod provenance;

// Re-export commonly used types
pub use agent::{Agent, AgentKind};
pub use config::{ConfigIssue, ConfigIssueCode, OutputFormat, Severity};
pub use consensus::{
    AgreementMatrix, ConsensusPolicy, ConsensusRun, ConsensusVerdict, DisagreementArea,
    ModelResponse, reconcile,
};
pub use core::{
    error::DomainError,
    ids::{
        ActivityId, AgentId, ConsensusRunId, DecisionId, DocumentId, EntityId, ExecutionId,
        ExperimentId, FeedbackId, OverrideId, PatternId,
    },
    model::{EmbeddingModel, Model},
    score::UnitScore,
};
pub use decision::{
    ComplexityLevel, Decision, DecisionDraft, DecisionFactors, DecisionStatus,
    DocumentCharacteristics, Era, ExecutionStatus, PatternMerge, StrategyProposal, TemporalSpan,
    TermContext, ToolDescriptor, ToolExecution, ToolExecutionState, ToolRegistry,
    parse_strategy_proposal,
};
pub use experiment::{ExperimentRun, ExperimentStage, StatusCounts};
pub use feedback::{
    AgreementLevel, Feedback, FeedbackInput, FeedbackStatus, FeedbackType, Suggestions,
};
pub use learning::{
    ContextSignature, LearningPattern, LearningPolicy, PatternRecommendation, PatternSeed,
    PatternStatus, SuccessRatePolicy,
};
pub use overrides::{
    DecisionOverride, ExecutionResults, OverridePayload, OverrideType, PerformanceComparison,
};
pub use prompt::PromptTemplate;
pub use provenance::{Activity, ActivityKind, EntityKind, ProvEntity, ProvenanceLink};
