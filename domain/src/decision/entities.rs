//! Decision entity: one orchestration attempt for a (document, experiment,
//! term) triple.

use super::factors::DecisionFactors;
use super::value_objects::{DocumentCharacteristics, StrategyProposal};
use crate::core::error::DomainError;
use crate::core::ids::{AgentId, ConsensusRunId, DecisionId, ExperimentId, PatternId};
use crate::core::model::EmbeddingModel;
use crate::core::score::UnitScore;
use crate::provenance::ProvenanceLink;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Running,
    Completed,
    Error,
    Timeout,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Running => "running",
            DecisionStatus::Completed => "completed",
            DecisionStatus::Error => "error",
            DecisionStatus::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DecisionStatus::Running)
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DecisionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "running" => Ok(DecisionStatus::Running),
            "completed" => Ok(DecisionStatus::Completed),
            "error" => Ok(DecisionStatus::Error),
            "timeout" => Ok(DecisionStatus::Timeout),
            other => Err(DomainError::InvalidValue(format!(
                "unknown decision status '{other}'"
            ))),
        }
    }
}

/// Inputs of a new decision, snapshotted into the provenance ledger before
/// the decision row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionDraft {
    pub id: DecisionId,
    pub characteristics: DocumentCharacteristics,
    pub term: String,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<ExperimentId>,
    pub proposed_by: AgentId,
    pub deadline_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<DecisionId>,
}

impl DecisionDraft {
    pub fn new(
        characteristics: DocumentCharacteristics,
        term: impl Into<String>,
        goal: impl Into<String>,
        proposed_by: AgentId,
        deadline: Duration,
    ) -> Self {
        Self {
            id: DecisionId::generate(),
            characteristics,
            term: term.into(),
            goal: goal.into(),
            experiment_id: None,
            proposed_by,
            deadline_at: Utc::now()
                .checked_add_signed(deadline)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            derived_from: None,
        }
    }

    pub fn with_experiment(mut self, experiment_id: ExperimentId) -> Self {
        self.experiment_id = Some(experiment_id);
        self
    }

    pub fn derived_from(mut self, decision_id: DecisionId) -> Self {
        self.derived_from = Some(decision_id);
        self
    }
}

/// An orchestration decision.
///
/// Created `Running` with an empty selection, filled by
/// [`Decision::adopt_proposal`], then moved to a terminal status exactly once.
/// After that only [`Decision::mark_validated`] may change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub characteristics: DocumentCharacteristics,
    pub term: String,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<ExperimentId>,
    pub status: DecisionStatus,
    pub tools: Vec<String>,
    pub embedding_model: EmbeddingModel,
    pub strategy: String,
    pub confidence: UnitScore,
    pub reasoning: String,
    pub factors: DecisionFactors,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub deadline_at: DateTime<Utc>,
    pub validated: bool,
    pub expected_runtime_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_runtime_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_run: Option<ConsensusRunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<DecisionId>,
    pub proposed_by: AgentId,
    pub provenance: ProvenanceLink,
}

impl Decision {
    /// Open a running decision from a recorded draft.
    pub fn start(draft: DecisionDraft, provenance: ProvenanceLink) -> Self {
        Self {
            id: draft.id,
            characteristics: draft.characteristics,
            term: draft.term,
            goal: draft.goal,
            experiment_id: draft.experiment_id,
            status: DecisionStatus::Running,
            tools: Vec::new(),
            embedding_model: EmbeddingModel::default(),
            strategy: String::new(),
            confidence: UnitScore::ZERO,
            reasoning: String::new(),
            factors: DecisionFactors::default(),
            started_at: Utc::now(),
            ended_at: None,
            deadline_at: draft.deadline_at,
            validated: false,
            expected_runtime_ms: 0,
            actual_runtime_ms: None,
            error_message: None,
            needs_review: false,
            consensus_run: None,
            derived_from: draft.derived_from,
            proposed_by: draft.proposed_by,
            provenance,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_running(&self) -> Result<(), DomainError> {
        if self.is_terminal() {
            return Err(DomainError::AlreadyTerminal {
                entity: "decision",
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Fix the selection of a running decision.
    pub fn adopt_proposal(
        &mut self,
        proposal: StrategyProposal,
        confidence: UnitScore,
        factors: DecisionFactors,
        expected_runtime_ms: u64,
    ) -> Result<(), DomainError> {
        self.ensure_running()?;
        self.tools = proposal.tools;
        if let Some(model) = proposal.embedding_model {
            self.embedding_model = model;
        }
        self.strategy = proposal.strategy;
        self.reasoning = proposal.reasoning;
        self.confidence = confidence;
        self.factors = factors;
        self.expected_runtime_ms = expected_runtime_ms;
        Ok(())
    }

    /// Move to a terminal status.
    pub fn finalize(
        &mut self,
        status: DecisionStatus,
        error_message: Option<String>,
    ) -> Result<(), DomainError> {
        if !status.is_terminal() {
            return Err(DomainError::InvalidTransition {
                entity: "decision",
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.ensure_running()?;
        let now = Utc::now();
        self.status = status;
        self.ended_at = Some(now);
        self.error_message = error_message;
        if self.actual_runtime_ms.is_none() {
            self.actual_runtime_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        }
        Ok(())
    }

    /// The only mutation allowed once terminal.
    pub fn mark_validated(&mut self, actual_runtime_ms: Option<u64>) -> Result<(), DomainError> {
        if !self.is_terminal() {
            return Err(DomainError::InvalidTransition {
                entity: "decision",
                from: self.status.to_string(),
                to: "validated".to_string(),
            });
        }
        self.validated = true;
        if let Some(ms) = actual_runtime_ms {
            self.actual_runtime_ms = Some(ms);
        }
        Ok(())
    }

    /// Time left before the deadline; zero once passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.deadline_at - now).to_std().unwrap_or_default()
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline_at
    }

    /// The learned pattern merged into this decision, if any.
    pub fn applied_pattern(&self) -> Option<&PatternId> {
        self.factors.pattern_merge.as_ref().map(|m| &m.pattern_id)
    }

    /// Current selection as a proposal (used for override snapshots).
    pub fn selection(&self) -> StrategyProposal {
        StrategyProposal {
            tools: self.tools.clone(),
            embedding_model: Some(self.embedding_model.clone()),
            strategy: self.strategy.clone(),
            reasoning: self.reasoning.clone(),
            confidence: Some(self.confidence.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{ActivityId, DocumentId, EntityId};
    use crate::decision::value_objects::TemporalSpan;

    fn draft(deadline: Duration) -> DecisionDraft {
        DecisionDraft::new(
            DocumentCharacteristics {
                document_id: DocumentId::new("doc-1"),
                domain: "literature".into(),
                word_count: 1200,
                temporal_span: TemporalSpan::new(1600, 1700),
                complexity: UnitScore::saturating(0.4),
            },
            "broadcast",
            "track drift",
            AgentId::new("agt-orchestrator"),
            deadline,
        )
    }

    fn decision() -> Decision {
        Decision::start(
            draft(Duration::seconds(60)),
            ProvenanceLink::new(ActivityId::new("act-1"), EntityId::new("ent-1")),
        )
    }

    #[test]
    fn test_start_is_running() {
        let d = decision();
        assert_eq!(d.status, DecisionStatus::Running);
        assert!(d.tools.is_empty());
        assert!(!d.validated);
    }

    #[test]
    fn test_adopt_and_finalize() {
        let mut d = decision();
        let p = StrategyProposal::new(vec!["A".into(), "B".into()], "baseline")
            .with_embedding_model(EmbeddingModel::MacBerth);
        d.adopt_proposal(p, UnitScore::saturating(0.85), DecisionFactors::default(), 300)
            .unwrap();
        assert_eq!(d.tools, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(d.embedding_model, EmbeddingModel::MacBerth);

        d.finalize(DecisionStatus::Completed, None).unwrap();
        assert!(d.is_terminal());
        assert!(d.ended_at.is_some());
        assert!(d.actual_runtime_ms.is_some());
    }

    #[test]
    fn test_finalize_rejects_running_target_and_double_finalize() {
        let mut d = decision();
        assert!(d.finalize(DecisionStatus::Running, None).is_err());
        d.finalize(DecisionStatus::Error, Some("llm down".into())).unwrap();
        let err = d.finalize(DecisionStatus::Completed, None).unwrap_err();
        assert!(matches!(err, DomainError::AlreadyTerminal { .. }));
        assert_eq!(d.status, DecisionStatus::Error);
    }

    #[test]
    fn test_terminal_decision_rejects_new_selection() {
        let mut d = decision();
        d.finalize(DecisionStatus::Timeout, None).unwrap();
        let p = StrategyProposal::new(vec!["A".into()], "s");
        assert!(
            d.adopt_proposal(p, UnitScore::ONE, DecisionFactors::default(), 0)
                .is_err()
        );
    }

    #[test]
    fn test_mark_validated_only_when_terminal() {
        let mut d = decision();
        assert!(d.mark_validated(None).is_err());
        d.finalize(DecisionStatus::Completed, None).unwrap();
        d.mark_validated(Some(1234)).unwrap();
        assert!(d.validated);
        assert_eq!(d.actual_runtime_ms, Some(1234));
    }

    #[test]
    fn test_remaining_deadline() {
        let d = Decision::start(
            draft(Duration::seconds(-1)),
            ProvenanceLink::new(ActivityId::new("a"), EntityId::new("e")),
        );
        assert!(d.deadline_passed(Utc::now()));
        assert_eq!(d.remaining(Utc::now()), std::time::Duration::ZERO);
    }

    #[test]
    fn test_unbounded_deadline_clamps() {
        let d = draft(Duration::MAX);
        assert_eq!(d.deadline_at, DateTime::<Utc>::MAX_UTC);
        let decision = Decision::start(
            d,
            ProvenanceLink::new(ActivityId::new("act-1"), EntityId::new("ent-1")),
        );
        assert!(!decision.deadline_passed(Utc::now()));
        assert!(decision.remaining(Utc::now()) > std::time::Duration::from_secs(3600));
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Completed".parse::<DecisionStatus>().unwrap(), DecisionStatus::Completed);
        assert!("done".parse::<DecisionStatus>().is_err());
    }
}
