//! Feedback collector use case
//!
//! Accepts researcher feedback on finished decisions, moves it through
//! review, and hands integrated feedback to the pattern learner.

use crate::error::EngineError;
use crate::ports::repository::{DecisionFilter, DecisionRepository, FeedbackRepository};
use crate::use_cases::agent_registry::AgentRegistry;
use crate::use_cases::pattern_learner::{LearningHandle, PatternLearner};
use crate::use_cases::provenance::ProvenanceRecorder;
use crate::use_cases::shared::{InFlightSet, load_decision};
use semantra_domain::{
    ActivityKind, AgentId, Decision, DecisionId, EntityKind, Feedback, FeedbackId, FeedbackInput,
    FeedbackStatus, PatternSeed, ProvenanceLink, UnitScore,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct FeedbackCollector {
    feedback: Arc<dyn FeedbackRepository>,
    decisions: Arc<dyn DecisionRepository>,
    agents: Arc<AgentRegistry>,
    learner: Arc<PatternLearner>,
    provenance: ProvenanceRecorder,
    actor: AgentId,
    in_flight: InFlightSet<FeedbackId>,
}

impl FeedbackCollector {
    pub fn new(
        feedback: Arc<dyn FeedbackRepository>,
        decisions: Arc<dyn DecisionRepository>,
        agents: Arc<AgentRegistry>,
        learner: Arc<PatternLearner>,
        provenance: ProvenanceRecorder,
        actor: AgentId,
    ) -> Self {
        Self {
            feedback,
            decisions,
            agents,
            learner,
            provenance,
            actor,
            in_flight: InFlightSet::new(),
        }
    }

    /// Store a pending feedback row.
    ///
    /// The decision must be terminal and the researcher registered.
    pub async fn submit(&self, input: FeedbackInput) -> Result<Feedback, EngineError> {
        let decision = load_decision(self.decisions.as_ref(), &input.decision_id).await?;
        input.check_decision(&decision)?;
        UnitScore::new("confidence_assessment", input.confidence_assessment)?;
        self.agents.require(&input.researcher).await?;

        let activity = self
            .provenance
            .begin(
                ActivityKind::FeedbackSubmission,
                &input.researcher,
                json!({
                    "decision": input.decision_id,
                    "type": input.feedback_type.as_str(),
                    "agreement": input.agreement.as_str(),
                }),
            )
            .await?;
        let researcher = input.researcher.clone();
        let mut feedback = Feedback::from_input(input, ProvenanceLink::pending(activity.clone()))?;
        feedback.provenance = self
            .provenance
            .generated(
                &activity,
                EntityKind::Feedback,
                &feedback,
                std::slice::from_ref(&decision.provenance.entity),
            )
            .await?;
        self.feedback.insert(&feedback).await?;
        self.agents.increment(&researcher).await?;

        info!(
            "Feedback {} on {} from {} ({})",
            feedback.id,
            feedback.decision_id,
            researcher,
            feedback.agreement.as_str()
        );
        Ok(feedback)
    }

    /// Record a review outcome: reviewed, rejected or obsolete.
    pub async fn review(
        &self,
        id: &FeedbackId,
        outcome: FeedbackStatus,
        reviewer: &AgentId,
    ) -> Result<Feedback, EngineError> {
        if !matches!(
            outcome,
            FeedbackStatus::Reviewed | FeedbackStatus::Rejected | FeedbackStatus::Obsolete
        ) {
            return Err(EngineError::invalid(format!(
                "'{outcome}' is not a review outcome"
            )));
        }
        let params = json!({ "feedback": id, "outcome": outcome.as_str() });
        self.move_to(id, outcome, reviewer, params).await
    }

    /// Mark feedback integrated and start learning from it.
    ///
    /// The returned handle resolves once the pattern is written.
    pub async fn integrate(
        &self,
        id: &FeedbackId,
    ) -> Result<(Feedback, LearningHandle), EngineError> {
        let params = json!({ "feedback": id, "outcome": FeedbackStatus::Integrated.as_str() });
        let feedback = self
            .move_to(id, FeedbackStatus::Integrated, &self.actor, params)
            .await?;
        let decision = load_decision(self.decisions.as_ref(), &feedback.decision_id).await?;

        let seed = PatternSeed::from_feedback(&feedback, &decision);
        debug!(
            "Learning from feedback {} (signature {}, success {})",
            feedback.id, seed.signature, seed.success
        );
        let handle = self
            .learner
            .spawn(seed, vec![feedback.provenance.entity.clone()]);
        Ok((feedback, handle))
    }

    async fn move_to(
        &self,
        id: &FeedbackId,
        to: FeedbackStatus,
        actor: &AgentId,
        params: serde_json::Value,
    ) -> Result<Feedback, EngineError> {
        // Concurrent moves of one row would both pass the transition check
        let Some(_claim) = self.in_flight.claim(id) else {
            warn!("Feedback {} is already changing status", id);
            return Err(EngineError::invalid(format!(
                "feedback {id} is already changing status"
            )));
        };
        let current = self.require(id).await?;
        let mut feedback = current.clone();
        feedback.transition(to)?;
        feedback.provenance = self
            .provenance
            .revise(
                ActivityKind::FeedbackIntegration,
                actor,
                params,
                EntityKind::Feedback,
                &feedback,
                &current.provenance,
            )
            .await?;
        self.feedback.update(&feedback).await?;
        info!("Feedback {}: {} -> {}", id, current.status, to);
        Ok(feedback)
    }

    // ==================== Queries ====================

    pub async fn require(&self, id: &FeedbackId) -> Result<Feedback, EngineError> {
        self.feedback
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("feedback", id))
    }

    /// Decisions flagged for review that have no feedback yet, oldest first.
    pub async fn pending_reviews(&self) -> Result<Vec<Decision>, EngineError> {
        let filter = DecisionFilter {
            needs_review: Some(true),
            ..Default::default()
        };
        let mut pending = Vec::new();
        for decision in self.decisions.list(&filter).await? {
            if self.feedback.list_for_decision(&decision.id).await?.is_empty() {
                pending.push(decision);
            }
        }
        pending.sort_by_key(|d| d.started_at);
        Ok(pending)
    }

    pub async fn list(&self, status: Option<FeedbackStatus>) -> Result<Vec<Feedback>, EngineError> {
        let mut rows = self.feedback.list(status).await?;
        rows.sort_by_key(|f| f.submitted_at);
        Ok(rows)
    }

    pub async fn for_decision(&self, id: &DecisionId) -> Result<Vec<Feedback>, EngineError> {
        Ok(self.feedback.list_for_decision(id).await?)
    }
}
