//! Consensus validator use case
//!
//! Reconciles the proposals of several models for one decision and stores
//! the verdict as a [`ConsensusRun`].

use crate::error::EngineError;
use crate::ports::repository::ConsensusRepository;
use crate::use_cases::provenance::ProvenanceRecorder;
use semantra_domain::{
    ActivityKind, AgentId, ConsensusPolicy, ConsensusRun, Decision, DecisionId, EntityKind,
    ModelResponse, ProvenanceLink, reconcile,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ConsensusValidator {
    runs: Arc<dyn ConsensusRepository>,
    provenance: ProvenanceRecorder,
    policy: ConsensusPolicy,
    actor: AgentId,
}

impl ConsensusValidator {
    pub fn new(
        runs: Arc<dyn ConsensusRepository>,
        provenance: ProvenanceRecorder,
        policy: ConsensusPolicy,
        actor: AgentId,
    ) -> Self {
        Self {
            runs,
            provenance,
            policy,
            actor,
        }
    }

    pub fn policy(&self) -> &ConsensusPolicy {
        &self.policy
    }

    /// Reconcile `responses` for `decision` and persist the run.
    ///
    /// Fails with a validation error on an empty response set, a confidence
    /// outside `[0, 1]`, or the same model answering twice.
    pub async fn reconcile(
        &self,
        decision: &Decision,
        responses: Vec<ModelResponse>,
    ) -> Result<ConsensusRun, EngineError> {
        let verdict = reconcile(responses, &self.policy)?;

        let activity = self
            .provenance
            .begin(
                ActivityKind::ConsensusValidation,
                &self.actor,
                json!({
                    "decision": decision.id,
                    "models": verdict.models(),
                    "threshold": self.policy.threshold,
                }),
            )
            .await?;
        let mut run = ConsensusRun::new(
            decision.id.clone(),
            verdict,
            ProvenanceLink::pending(activity.clone()),
        );
        run.provenance = self
            .provenance
            .generated(
                &activity,
                EntityKind::ConsensusRun,
                &run,
                std::slice::from_ref(&decision.provenance.entity),
            )
            .await?;
        self.runs.insert(&run).await?;

        if run.verdict.consensus_reached {
            info!(
                "Consensus reached for {} (confidence {}, leader {})",
                decision.id, run.verdict.consensus_confidence, run.verdict.leader
            );
        } else {
            warn!(
                "No consensus for {}: {} disagreement(s), review required",
                decision.id,
                run.verdict.disagreements.len()
            );
        }
        Ok(run)
    }

    pub async fn runs_for(&self, decision: &DecisionId) -> Result<Vec<ConsensusRun>, EngineError> {
        Ok(self.runs.list_for_decision(decision).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryLedger, MemoryRepos, characteristics};
    use semantra_domain::{ActivityId, DecisionDraft, Model, StrategyProposal};

    fn validator(repos: &Arc<MemoryRepos>) -> ConsensusValidator {
        ConsensusValidator::new(
            repos.clone(),
            ProvenanceRecorder::new(Arc::new(MemoryLedger::default())),
            ConsensusPolicy::default(),
            AgentId::new("agt-engine"),
        )
    }

    fn decision() -> Decision {
        let draft = DecisionDraft::new(
            characteristics("doc-1"),
            "broadcast",
            "drift",
            AgentId::new("agt-engine"),
            chrono::Duration::seconds(60),
        );
        Decision::start(draft, ProvenanceLink::pending(ActivityId::new("act")))
    }

    fn response(model: Model, tools: &[&str], strategy: &str, confidence: f64) -> ModelResponse {
        ModelResponse::new(
            model,
            StrategyProposal::new(tools.iter().map(|t| t.to_string()).collect(), strategy),
            confidence,
        )
    }

    #[tokio::test]
    async fn test_agreeing_models_reach_consensus() {
        let repos = Arc::new(MemoryRepos::default());
        let validator = validator(&repos);
        let decision = decision();

        let run = validator
            .reconcile(
                &decision,
                vec![
                    response(Model::Qwen25, &["A", "B"], "contextual", 0.8),
                    response(Model::Mistral, &["A", "B"], "contextual", 0.9),
                ],
            )
            .await
            .unwrap();

        assert!(run.verdict.consensus_reached);
        assert!(!run.verdict.review_required);
        assert_eq!(run.verdict.leader, Model::Mistral);
        assert!(run.verdict.matrix.is_symmetric());
        assert_eq!(validator.runs_for(&decision.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disagreement_requires_review() {
        let repos = Arc::new(MemoryRepos::default());
        let validator = validator(&repos);

        let run = validator
            .reconcile(
                &decision(),
                vec![
                    response(Model::Qwen25, &["A"], "contextual", 0.8),
                    response(Model::Mistral, &["B", "C"], "diachronic", 0.7),
                ],
            )
            .await
            .unwrap();

        assert!(!run.verdict.consensus_reached);
        assert!(run.verdict.review_required);
        assert_eq!(run.verdict.disagreements.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_is_not_persisted() {
        let repos = Arc::new(MemoryRepos::default());
        let validator = validator(&repos);
        let decision = decision();

        let err = validator.reconcile(&decision, vec![]).await.unwrap_err();
        assert!(err.is_validation());

        let err = validator
            .reconcile(&decision, vec![response(Model::Qwen25, &["A"], "x", 1.2)])
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(validator.runs_for(&decision.id).await.unwrap().is_empty());
    }
}
