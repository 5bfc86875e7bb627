//! Override manager use case
//!
//! A researcher replaces part of a finished decision's selection. The
//! pipeline is re-run as a new decision derived from the original, the two
//! runs are compared, and the outcome is fed to the pattern learner.

use crate::error::EngineError;
use crate::ports::repository::{DecisionRepository, OverrideRepository};
use crate::use_cases::agent_registry::AgentRegistry;
use crate::use_cases::orchestrator::DecisionOrchestrator;
use crate::use_cases::pattern_learner::{LearningHandle, PatternLearner};
use crate::use_cases::provenance::ProvenanceRecorder;
use crate::use_cases::shared::{InFlightSet, load_decision};
use semantra_domain::{
    ActivityKind, AgentId, Decision, DecisionId, DecisionOverride, DomainError,
    EntityKind, ExecutionResults, OverrideId, OverridePayload, OverrideType, PatternSeed,
    PerformanceComparison, ProvenanceLink,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct OverrideRequest {
    pub decision_id: DecisionId,
    pub researcher: AgentId,
    pub override_type: OverrideType,
    pub payload: OverridePayload,
    pub justification: String,
}

/// Result of applying an override.
pub struct AppliedOverride {
    pub record: DecisionOverride,
    /// The re-executed decision.
    pub decision: Decision,
    pub learning: LearningHandle,
}

pub struct OverrideManager {
    overrides: Arc<dyn OverrideRepository>,
    decisions: Arc<dyn DecisionRepository>,
    orchestrator: Arc<DecisionOrchestrator>,
    learner: Arc<PatternLearner>,
    agents: Arc<AgentRegistry>,
    provenance: ProvenanceRecorder,
    in_flight: InFlightSet<OverrideId>,
}

impl OverrideManager {
    pub fn new(
        overrides: Arc<dyn OverrideRepository>,
        decisions: Arc<dyn DecisionRepository>,
        orchestrator: Arc<DecisionOrchestrator>,
        learner: Arc<PatternLearner>,
        agents: Arc<AgentRegistry>,
        provenance: ProvenanceRecorder,
    ) -> Self {
        Self {
            overrides,
            decisions,
            orchestrator,
            learner,
            agents,
            provenance,
            in_flight: InFlightSet::new(),
        }
    }

    /// Record and immediately apply an override.
    pub async fn apply(&self, request: OverrideRequest) -> Result<AppliedOverride, EngineError> {
        let record = self.record(request).await?;
        self.apply_existing(&record.id).await
    }

    /// Snapshot the decision's selection and store the unapplied override.
    pub async fn record(&self, request: OverrideRequest) -> Result<DecisionOverride, EngineError> {
        let decision = load_decision(self.decisions.as_ref(), &request.decision_id).await?;
        self.agents.require(&request.researcher).await?;
        // Surface a bad payload or a running decision before touching the ledger
        DecisionOverride::check(&decision, request.override_type, &request.payload)?;

        let activity = self
            .provenance
            .begin(
                ActivityKind::OverrideApplication,
                &request.researcher,
                json!({
                    "decision": request.decision_id,
                    "type": request.override_type.as_str(),
                    "justification": request.justification,
                }),
            )
            .await?;
        let researcher = request.researcher.clone();
        let mut record = DecisionOverride::record(
            &decision,
            request.researcher,
            request.override_type,
            request.payload,
            request.justification,
            ProvenanceLink::pending(activity.clone()),
        )?;
        record.provenance = self
            .provenance
            .generated(
                &activity,
                EntityKind::Override,
                &record,
                std::slice::from_ref(&decision.provenance.entity),
            )
            .await?;
        self.overrides.insert(&record).await?;
        self.agents.increment(&researcher).await?;

        info!(
            "Override {} ({}) recorded on {}",
            record.id,
            record.override_type.as_str(),
            record.decision_id
        );
        Ok(record)
    }

    /// Re-execute with the overridden selection and store the comparison.
    ///
    /// Rejected once the override is applied, or while another call is
    /// applying it.
    pub async fn apply_existing(&self, id: &OverrideId) -> Result<AppliedOverride, EngineError> {
        let Some(_claim) = self.in_flight.claim(id) else {
            warn!("Override {} is already being applied", id);
            return Err(DomainError::OverrideAlreadyApplied.into());
        };

        let current = self.require(id).await?;
        let selection = current.target_selection()?;
        let original = load_decision(self.decisions.as_ref(), &current.decision_id).await?;
        let original_runs = self.orchestrator.executions(&original.id).await?;

        let derived = self
            .orchestrator
            .re_execute(&original, selection, &current.researcher)
            .await?;
        let derived_runs = self.orchestrator.executions(&derived.id).await?;

        let before = ExecutionResults::summarize(&original, &original_runs);
        let after = ExecutionResults::summarize(&derived, &derived_runs);
        let performance = PerformanceComparison::compare(&before, &after);

        let mut record = current.clone();
        record.mark_applied(after, performance)?;
        record.provenance = self
            .provenance
            .revise(
                ActivityKind::OverrideApplication,
                &current.researcher,
                json!({ "override": id, "derived_decision": derived.id }),
                EntityKind::Override,
                &record,
                &current.provenance,
            )
            .await?;
        self.overrides.update(&record).await?;
        info!(
            "Override {} applied: {} -> {} ({})",
            id, original.id, derived.id, derived.status
        );

        let seed = PatternSeed::from_override(&record, &original, self.learner.policy());
        let learning = self.learner.spawn(
            seed,
            vec![
                record.provenance.entity.clone(),
                derived.provenance.entity.clone(),
            ],
        );
        Ok(AppliedOverride {
            record,
            decision: derived,
            learning,
        })
    }

    pub async fn require(&self, id: &OverrideId) -> Result<DecisionOverride, EngineError> {
        self.overrides
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("override", id))
    }

    pub async fn for_decision(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Vec<DecisionOverride>, EngineError> {
        Ok(self.overrides.list_for_decision(decision_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ports::repository::DecisionFilter;
    use crate::testing::*;
    use semantra_domain::{AgentKind, DecisionStatus, Model, PatternStatus};

    async fn setup() -> (TestEngine, Decision, AgentId) {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A", "B"], "contextual", 0.85));
        let invoker = ScriptedInvoker::new()
            .output("A", "a ran", 0.6)
            .output("B", "b ran", 0.6)
            .output("C", "c ran", 0.9);
        let t = test_engine(gateway, invoker, EngineConfig::default()).await;
        let decision = t
            .engine
            .orchestrator()
            .process_document(
                &"doc-1".into(),
                semantra_domain::TermContext::new("broadcast"),
                "drift",
                None,
            )
            .await
            .unwrap();
        let researcher = t
            .engine
            .agents()
            .register(AgentKind::person("Ada"))
            .await
            .unwrap()
            .id;
        (t, decision, researcher)
    }

    fn request(decision: &Decision, researcher: &AgentId) -> OverrideRequest {
        OverrideRequest {
            decision_id: decision.id.clone(),
            researcher: researcher.clone(),
            override_type: OverrideType::ToolSelection,
            payload: OverridePayload {
                tools: vec!["C".into()],
                ..Default::default()
            },
            justification: "C handles early modern spelling".into(),
        }
    }

    #[tokio::test]
    async fn test_apply_re_executes_and_compares() {
        let (t, original, researcher) = setup().await;
        assert_eq!(original.status, DecisionStatus::Completed);

        let applied = t
            .engine
            .overrides()
            .apply(request(&original, &researcher))
            .await
            .unwrap();

        assert!(applied.record.applied);
        assert_eq!(applied.decision.derived_from, Some(original.id.clone()));
        assert_eq!(applied.decision.tools, vec!["C"]);
        assert_eq!(applied.decision.status, DecisionStatus::Completed);
        let performance = applied.record.performance.clone().unwrap();
        assert_eq!(performance.tools_added, vec!["C"]);
        assert_eq!(performance.tools_removed, vec!["A", "B"]);
        assert!((performance.quality_delta.unwrap() - 0.3).abs() < 1e-9);

        let outcome = applied.learning.wait().await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.pattern.status, PatternStatus::Experimental);
        assert_eq!(outcome.pattern.recommendation.tools, vec!["C"]);
    }

    #[tokio::test]
    async fn test_second_apply_is_rejected() {
        let (t, original, researcher) = setup().await;
        let manager = t.engine.overrides();
        let record = manager.record(request(&original, &researcher)).await.unwrap();

        let (first, second) =
            tokio::join!(manager.apply_existing(&record.id), manager.apply_existing(&record.id));
        assert!(first.is_ok());
        assert_eq!(
            second.err(),
            Some(EngineError::Validation(DomainError::OverrideAlreadyApplied))
        );

        let again = manager.apply_existing(&record.id).await.err();
        assert_eq!(
            again,
            Some(EngineError::Validation(DomainError::OverrideAlreadyApplied))
        );

        let derived: Vec<Decision> = t
            .engine
            .orchestrator()
            .decisions(&DecisionFilter::default())
            .await
            .unwrap()
            .into_iter()
            .filter(|d| d.derived_from.as_ref() == Some(&original.id))
            .collect();
        assert_eq!(derived.len(), 1);
        let stored = manager.require(&record.id).await.unwrap();
        assert_eq!(stored.derived_decision, Some(derived[0].id.clone()));
    }

    #[tokio::test]
    async fn test_running_decision_cannot_be_overridden() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A"], "contextual", 0.85));
        let t = test_engine(gateway, ScriptedInvoker::new(), EngineConfig::default()).await;
        let running = t
            .engine
            .orchestrator()
            .propose(crate::use_cases::orchestrator::ProposeInput::new(
                characteristics("doc-1"),
                semantra_domain::TermContext::new("broadcast"),
                "drift",
            ))
            .await
            .unwrap();
        let researcher = t
            .engine
            .agents()
            .register(AgentKind::person("Ada"))
            .await
            .unwrap()
            .id;

        let err = t
            .engine
            .overrides()
            .record(request(&running, &researcher))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(t.engine.overrides().for_decision(&running.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payload_must_cover_the_type() {
        let (t, original, researcher) = setup().await;
        let mut bad = request(&original, &researcher);
        bad.override_type = OverrideType::Strategy;

        let err = t.engine.overrides().record(bad).await.unwrap_err();
        assert!(err.is_validation());
    }
}
