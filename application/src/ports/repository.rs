//! Repository ports
//!
//! One trait per table. Implementations decide how rows are stored; the
//! engine relies only on the contracts below:
//!
//! - `insert` fails with [`RepositoryError::Duplicate`] when the key exists
//! - `update` fails with [`RepositoryError::NotFound`] when it does not
//! - patterns are written with a versioned compare-and-swap

use async_trait::async_trait;
use semantra_domain::{
    Agent, AgentId, ConsensusRun, ConsensusRunId, Decision, DecisionId, DecisionOverride,
    DecisionStatus, ExecutionId, ExperimentId, ExperimentRun, Feedback, FeedbackId,
    FeedbackStatus, LearningPattern, OverrideId, PatternId, ToolExecution,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn duplicate(kind: &'static str, id: impl ToString) -> Self {
        RepositoryError::Duplicate {
            kind,
            id: id.to_string(),
        }
    }
}

/// Filter for decision listings; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionFilter {
    pub experiment: Option<ExperimentId>,
    pub status: Option<DecisionStatus>,
    pub needs_review: Option<bool>,
}

impl DecisionFilter {
    pub fn matches(&self, decision: &Decision) -> bool {
        self.experiment
            .as_ref()
            .is_none_or(|e| decision.experiment_id.as_ref() == Some(e))
            && self.status.is_none_or(|s| decision.status == s)
            && self.needs_review.is_none_or(|r| decision.needs_review == r)
    }
}

#[async_trait]
pub trait DecisionRepository: Send + Sync {
    async fn insert(&self, decision: &Decision) -> Result<(), RepositoryError>;
    async fn update(&self, decision: &Decision) -> Result<(), RepositoryError>;
    async fn get(&self, id: &DecisionId) -> Result<Option<Decision>, RepositoryError>;
    async fn list(&self, filter: &DecisionFilter) -> Result<Vec<Decision>, RepositoryError>;
}

#[async_trait]
pub trait ToolExecutionRepository: Send + Sync {
    /// Fails with `Duplicate` when the decision already has this `execution_order`.
    async fn insert(&self, execution: &ToolExecution) -> Result<(), RepositoryError>;
    async fn update(&self, execution: &ToolExecution) -> Result<(), RepositoryError>;
    async fn get(&self, id: &ExecutionId) -> Result<Option<ToolExecution>, RepositoryError>;
    /// Executions of a decision ordered by `execution_order`.
    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<ToolExecution>, RepositoryError>;
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    async fn insert(&self, feedback: &Feedback) -> Result<(), RepositoryError>;
    async fn update(&self, feedback: &Feedback) -> Result<(), RepositoryError>;
    async fn get(&self, id: &FeedbackId) -> Result<Option<Feedback>, RepositoryError>;
    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<Feedback>, RepositoryError>;
    async fn list(&self, status: Option<FeedbackStatus>) -> Result<Vec<Feedback>, RepositoryError>;
}

#[async_trait]
pub trait OverrideRepository: Send + Sync {
    async fn insert(&self, record: &DecisionOverride) -> Result<(), RepositoryError>;
    async fn update(&self, record: &DecisionOverride) -> Result<(), RepositoryError>;
    async fn get(&self, id: &OverrideId) -> Result<Option<DecisionOverride>, RepositoryError>;
    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<DecisionOverride>, RepositoryError>;
}

/// The only multi-writer table.
#[async_trait]
pub trait PatternRepository: Send + Sync {
    /// Store a new pattern at version 1.
    async fn insert(&self, pattern: &LearningPattern) -> Result<LearningPattern, RepositoryError>;

    /// Store a new pattern at version 1 unless a live pattern already covers
    /// its signature.
    ///
    /// The check and the insert happen under one lock. When a live pattern
    /// wins, returns `VersionConflict` carrying that pattern's id and version.
    async fn insert_if_absent(
        &self,
        pattern: &LearningPattern,
    ) -> Result<LearningPattern, RepositoryError>;

    async fn get(&self, id: &PatternId) -> Result<Option<LearningPattern>, RepositoryError>;

    async fn list(&self) -> Result<Vec<LearningPattern>, RepositoryError>;

    /// Replace the stored pattern if its version still equals `expected_version`.
    ///
    /// Returns the stored row with the bumped version, or `VersionConflict`.
    async fn compare_and_swap(
        &self,
        pattern: &LearningPattern,
        expected_version: u64,
    ) -> Result<LearningPattern, RepositoryError>;
}

#[async_trait]
pub trait ConsensusRepository: Send + Sync {
    async fn insert(&self, run: &ConsensusRun) -> Result<(), RepositoryError>;
    async fn get(&self, id: &ConsensusRunId) -> Result<Option<ConsensusRun>, RepositoryError>;
    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<ConsensusRun>, RepositoryError>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn insert(&self, agent: &Agent) -> Result<(), RepositoryError>;
    async fn get(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Agent>, RepositoryError>;

    /// Atomically add `delta` to the reference count (saturating at zero).
    async fn adjust_references(&self, id: &AgentId, delta: i64) -> Result<Agent, RepositoryError>;
}

#[async_trait]
pub trait ExperimentRepository: Send + Sync {
    async fn insert(&self, run: &ExperimentRun) -> Result<(), RepositoryError>;
    async fn update(&self, run: &ExperimentRun) -> Result<(), RepositoryError>;
    async fn get(&self, id: &ExperimentId) -> Result<Option<ExperimentRun>, RepositoryError>;
    async fn list(&self) -> Result<Vec<ExperimentRun>, RepositoryError>;
}
