//! Experiment runs: a batch of documents processed for one term and goal.
//!
//! # Stage Transitions
//!
//! ```text
//! Pending ──> Analyzing ──> StrategyProposed ──> Executing ──> Completed
//!    └───────────┴──────────────┴───────────────────┴───────> Failed
//! ```

use crate::core::error::DomainError;
use crate::core::ids::{DecisionId, DocumentId, ExperimentId};
use crate::decision::DecisionStatus;
use crate::provenance::ProvenanceLink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStage {
    Pending,
    Analyzing,
    StrategyProposed,
    Executing,
    Completed,
    Failed,
}

impl ExperimentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStage::Pending => "pending",
            ExperimentStage::Analyzing => "analyzing",
            ExperimentStage::StrategyProposed => "strategy_proposed",
            ExperimentStage::Executing => "executing",
            ExperimentStage::Completed => "completed",
            ExperimentStage::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, to: ExperimentStage) -> bool {
        use ExperimentStage::*;
        matches!(
            (self, to),
            (Pending, Analyzing)
                | (Analyzing, StrategyProposed)
                | (StrategyProposed, Executing)
                | (Executing, Completed)
                | (Pending | Analyzing | StrategyProposed | Executing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExperimentStage::Completed | ExperimentStage::Failed)
    }
}

impl std::fmt::Display for ExperimentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-status decision counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub running: usize,
    pub completed: usize,
    pub error: usize,
    pub timeout: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: DecisionStatus) {
        match status {
            DecisionStatus::Running => self.running += 1,
            DecisionStatus::Completed => self.completed += 1,
            DecisionStatus::Error => self.error += 1,
            DecisionStatus::Timeout => self.timeout += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.running + self.completed + self.error + self.timeout
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRun {
    pub id: ExperimentId,
    pub term: String,
    pub goal: String,
    pub stage: ExperimentStage,
    pub documents: Vec<DocumentId>,
    #[serde(default)]
    pub decisions: Vec<DecisionId>,
    #[serde(default)]
    pub counts: StatusCounts,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub provenance: ProvenanceLink,
}

impl ExperimentRun {
    pub fn new(
        id: ExperimentId,
        term: impl Into<String>,
        goal: impl Into<String>,
        documents: Vec<DocumentId>,
        provenance: ProvenanceLink,
    ) -> Self {
        Self {
            id,
            term: term.into(),
            goal: goal.into(),
            stage: ExperimentStage::Pending,
            documents,
            decisions: Vec::new(),
            counts: StatusCounts::default(),
            started_at: Utc::now(),
            ended_at: None,
            failure: None,
            provenance,
        }
    }

    pub fn advance(&mut self, to: ExperimentStage) -> Result<(), DomainError> {
        if !self.stage.can_transition_to(to) {
            return Err(DomainError::InvalidTransition {
                entity: "experiment",
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }
        self.stage = to;
        if to.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.advance(ExperimentStage::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    /// Move from executing to completed, or failed when nothing completed.
    pub fn conclude(&mut self) -> Result<(), DomainError> {
        if self.counts.completed > 0 {
            self.advance(ExperimentStage::Completed)
        } else {
            self.fail(format!(
                "no decision completed ({} error, {} timeout)",
                self.counts.error, self.counts.timeout
            ))
        }
    }
}
