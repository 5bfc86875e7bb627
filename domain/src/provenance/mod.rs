//! Provenance domain
//!
//! Every persisted entity of the engine must be generated by a recorded
//! activity. An activity is *something that happened* (a proposal, a
//! feedback submission, a pattern update), performed by an agent; an entity
//! is *something that was produced*, generated by exactly one activity and
//! optionally derived from earlier entities.
//!
//! ```text
//!   Agent ──associated with──> Activity ──generated──> Entity
//!                                                        │
//!                                          derived from  ▼
//!                                                      Entity
//! ```

use crate::core::ids::{ActivityId, AgentId, EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    StrategyProposal,
    ToolExecution,
    DecisionFinalization,
    ConsensusValidation,
    FeedbackSubmission,
    FeedbackIntegration,
    OverrideApplication,
    PatternLearning,
    ExperimentRun,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::StrategyProposal => "strategy_proposal",
            ActivityKind::ToolExecution => "tool_execution",
            ActivityKind::DecisionFinalization => "decision_finalization",
            ActivityKind::ConsensusValidation => "consensus_validation",
            ActivityKind::FeedbackSubmission => "feedback_submission",
            ActivityKind::FeedbackIntegration => "feedback_integration",
            ActivityKind::OverrideApplication => "override_application",
            ActivityKind::PatternLearning => "pattern_learning",
            ActivityKind::ExperimentRun => "experiment_run",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Decision,
    ToolExecution,
    Feedback,
    Override,
    LearningPattern,
    ConsensusRun,
    ExperimentRun,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Decision => "decision",
            EntityKind::ToolExecution => "tool_execution",
            EntityKind::Feedback => "feedback",
            EntityKind::Override => "override",
            EntityKind::LearningPattern => "learning_pattern",
            EntityKind::ConsensusRun => "consensus_run",
            EntityKind::ExperimentRun => "experiment_run",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub kind: ActivityKind,
    pub actor: AgentId,
    pub params: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// A recorded entity: the ledger's view of a persisted row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Snapshot of the row at generation time.
    pub value: serde_json::Value,
    pub generated_by: ActivityId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_from: Vec<EntityId>,
    pub recorded_at: DateTime<Utc>,
}

/// Link from a domain row to its generation record in the ledger.
///
/// Every persisted entity carries one of these; a row whose link cannot be
/// resolved in the ledger is a consistency violation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvenanceLink {
    pub activity: ActivityId,
    pub entity: EntityId,
}

impl ProvenanceLink {
    pub fn new(activity: ActivityId, entity: EntityId) -> Self {
        Self { activity, entity }
    }

    /// Link for a row whose entity record is written after the row is built.
    pub fn pending(activity: ActivityId) -> Self {
        Self {
            activity,
            entity: EntityId::new(""),
        }
    }

    pub fn is_recorded(&self) -> bool {
        !self.entity.as_str().is_empty()
    }
}
