//! Decision orchestrator use case
//!
//! Proposes a processing strategy for one document and carries the decision
//! through execution to a terminal status.
//!
//! # Flow
//!
//! ```text
//! propose ──> LLM (or consensus of several) ──> parse ──> drop unknown tools
//!         ──> score factors ──> merge best learned pattern ──> running decision
//! execute ──> tool tracker ──> finalize (completed | error | timeout)
//! ```
//!
//! LLM failures and deadline overruns are not raised: the decision is
//! finalized as `error` or `timeout` and returned.

use crate::config::{EngineConfig, ExecutionParams, ModelSelection};
use crate::error::EngineError;
use crate::ports::document_service::DocumentService;
use crate::ports::llm_gateway::{GatewayError, LlmGateway};
use crate::ports::repository::{DecisionFilter, DecisionRepository};
use crate::use_cases::agent_registry::AgentRegistry;
use crate::use_cases::consensus::ConsensusValidator;
use crate::use_cases::pattern_learner::PatternLearner;
use crate::use_cases::provenance::ProvenanceRecorder;
use crate::use_cases::shared::load_decision;
use crate::use_cases::tool_tracker::ToolExecutionTracker;
use chrono::Utc;
use semantra_domain::decision::{ConfidenceSource, ConsensusSummary};
use semantra_domain::{
    ActivityId, ActivityKind, AgentId, ConsensusRun, ContextSignature, Decision, DecisionDraft,
    DecisionFactors, DecisionId, DecisionStatus, DocumentCharacteristics, DocumentId, DomainError,
    EntityId, EntityKind, ExecutionStatus, ExperimentId, LearningPattern, Model, ModelResponse,
    PatternMerge, PromptTemplate, ProvenanceLink, StrategyProposal, TermContext, ToolExecution,
    ToolRegistry, UnitScore, parse_strategy_proposal,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Pause before retrying a failed LLM call, multiplied by the attempt number.
const LLM_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Input for a proposal
#[derive(Debug, Clone)]
pub struct ProposeInput {
    pub characteristics: DocumentCharacteristics,
    pub term: TermContext,
    pub goal: String,
    pub experiment_id: Option<ExperimentId>,
}

impl ProposeInput {
    pub fn new(
        characteristics: DocumentCharacteristics,
        term: TermContext,
        goal: impl Into<String>,
    ) -> Self {
        Self {
            characteristics,
            term,
            goal: goal.into(),
            experiment_id: None,
        }
    }

    pub fn with_experiment(mut self, experiment_id: Option<ExperimentId>) -> Self {
        self.experiment_id = experiment_id;
        self
    }
}

/// The components the orchestrator delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub tracker: Arc<ToolExecutionTracker>,
    pub learner: Arc<PatternLearner>,
    pub consensus: Arc<ConsensusValidator>,
    pub agents: Arc<AgentRegistry>,
    pub provenance: ProvenanceRecorder,
}

/// A parsed proposal and how it was obtained.
struct Obtained {
    proposal: StrategyProposal,
    attempts: u32,
    latency_ms: u64,
    consensus: Option<ConsensusRun>,
}

pub struct DecisionOrchestrator {
    gateway: Arc<dyn LlmGateway>,
    documents: Arc<dyn DocumentService>,
    decisions: Arc<dyn DecisionRepository>,
    registry: Arc<ToolRegistry>,
    parts: Collaborators,
    execution: ExecutionParams,
    models: ModelSelection,
    actor: AgentId,
}

impl DecisionOrchestrator {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        documents: Arc<dyn DocumentService>,
        decisions: Arc<dyn DecisionRepository>,
        registry: Arc<ToolRegistry>,
        parts: Collaborators,
        config: &EngineConfig,
        actor: AgentId,
    ) -> Self {
        Self {
            gateway,
            documents,
            decisions,
            registry,
            parts,
            execution: config.execution.clone(),
            models: config.models.clone(),
            actor,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &ToolExecutionTracker {
        &self.parts.tracker
    }

    /// Configured proposal and consensus models the gateway does not serve.
    pub async fn unavailable_models(&self) -> Result<Vec<Model>, EngineError> {
        let served = self.gateway.available_models().await?;
        let mut missing: Vec<Model> = std::iter::once(&self.models.proposal)
            .chain(&self.models.consensus)
            .filter(|m| !served.contains(m))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        Ok(missing)
    }

    // ==================== Propose ====================

    /// Register a running decision and fix its strategy.
    ///
    /// Fails only on invalid input or storage errors. A decision the LLM
    /// could not produce a proposal for is returned finalized.
    pub async fn propose(&self, input: ProposeInput) -> Result<Decision, EngineError> {
        if self.registry.is_empty() {
            return Err(DomainError::NoToolsAvailable.into());
        }

        let params = json!({
            "document": input.characteristics.document_id,
            "term": input.term.term,
            "goal": input.goal,
        });
        let (mut decision, activity) = self.open(&input, None, params).await?;
        info!(
            "Proposing strategy for {} (decision {})",
            input.characteristics.document_id, decision.id
        );

        let remaining = decision.remaining(Utc::now());
        let obtained =
            match tokio::time::timeout(remaining, self.obtain_proposal(&decision, &input.term)).await
            {
                Ok(Ok(obtained)) => obtained,
                Ok(Err(e)) => {
                    warn!("No proposal for {}: {}", decision.id, e);
                    return self
                        .finalize(&decision.id, DecisionStatus::Error, Some(e.to_string()))
                        .await;
                }
                Err(_) => {
                    warn!("Proposal for {} exceeded the decision deadline", decision.id);
                    return self
                        .finalize(
                            &decision.id,
                            DecisionStatus::Timeout,
                            Some("no proposal before the decision deadline".to_string()),
                        )
                        .await;
                }
            };

        let pattern = self
            .parts
            .learner
            .best_match(&ContextSignature::from_characteristics(&decision.characteristics))
            .await?;
        if let Err(message) = self.adopt(&mut decision, obtained, pattern) {
            warn!("Rejecting proposal for {}: {}", decision.id, message);
            return self
                .finalize(&decision.id, DecisionStatus::Error, Some(message))
                .await;
        }

        self.store_revision(&mut decision, &activity).await?;
        info!(
            "Decision {}: tools [{}], strategy '{}', confidence {}",
            decision.id,
            decision.tools.join(", "),
            decision.strategy,
            decision.confidence
        );
        Ok(decision)
    }

    /// Record and persist a fresh running decision.
    async fn open(
        &self,
        input: &ProposeInput,
        origin: Option<&Decision>,
        params: Value,
    ) -> Result<(Decision, ActivityId), EngineError> {
        let mut draft = DecisionDraft::new(
            input.characteristics.clone(),
            input.term.term.clone(),
            input.goal.clone(),
            self.actor.clone(),
            self.execution.decision_deadline_chrono(),
        );
        if let Some(experiment) = &input.experiment_id {
            draft = draft.with_experiment(experiment.clone());
        }
        if let Some(origin) = origin {
            draft = draft.derived_from(origin.id.clone());
        }

        let activity = self
            .parts
            .provenance
            .begin(ActivityKind::StrategyProposal, &self.actor, params)
            .await?;
        let mut decision = Decision::start(draft, ProvenanceLink::pending(activity.clone()));
        let derived: Vec<EntityId> = origin
            .map(|o| o.provenance.entity.clone())
            .into_iter()
            .collect();
        decision.provenance = self
            .parts
            .provenance
            .generated(&activity, EntityKind::Decision, &decision, &derived)
            .await?;
        self.decisions.insert(&decision).await?;
        self.parts.agents.increment(&self.actor).await?;
        Ok((decision, activity))
    }

    /// Write the adopted selection as a new revision of the decision entity.
    async fn store_revision(
        &self,
        decision: &mut Decision,
        activity: &ActivityId,
    ) -> Result<(), EngineError> {
        let previous = decision.provenance.entity.clone();
        decision.provenance = self
            .parts
            .provenance
            .generated(activity, EntityKind::Decision, &*decision, &[previous])
            .await?;
        self.decisions.update(decision).await?;
        Ok(())
    }

    async fn obtain_proposal(
        &self,
        decision: &Decision,
        term: &TermContext,
    ) -> Result<Obtained, EngineError> {
        let prompt = PromptTemplate::proposal_prompt(
            &decision.characteristics,
            term,
            &decision.goal,
            &self.registry,
        );
        if self.models.uses_consensus() {
            return self.obtain_consensus(decision, prompt).await;
        }

        let started = Instant::now();
        let (proposal, attempts) = ask_model(
            Arc::clone(&self.gateway),
            self.models.proposal.clone(),
            prompt,
            self.execution.max_llm_retries,
        )
        .await?;
        Ok(Obtained {
            proposal,
            attempts,
            latency_ms: started.elapsed().as_millis() as u64,
            consensus: None,
        })
    }

    /// Query every consensus model concurrently and reconcile the answers.
    async fn obtain_consensus(
        &self,
        decision: &Decision,
        prompt: String,
    ) -> Result<Obtained, EngineError> {
        let started = Instant::now();
        let mut join_set = JoinSet::new();
        for model in &self.models.consensus {
            let gateway = Arc::clone(&self.gateway);
            let model = model.clone();
            let prompt = prompt.clone();
            let retries = self.execution.max_llm_retries;
            join_set.spawn(async move {
                let result = ask_model(gateway, model.clone(), prompt, retries).await;
                (model, result)
            });
        }

        let mut responses = Vec::new();
        let mut failures = Vec::new();
        let mut attempts = 0;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((model, Ok((mut proposal, used)))) => {
                    attempts += used;
                    proposal.retain_known(&self.registry);
                    let confidence = proposal.reported_confidence().unwrap_or_else(|| {
                        DecisionFactors::assess(&decision.characteristics, &proposal, &self.registry)
                            .computed_confidence()
                    });
                    debug!("Model {} proposed [{}]", model, proposal.tools.join(", "));
                    responses.push(ModelResponse::new(model, proposal, confidence.value()));
                }
                Ok((model, Err(e))) => {
                    warn!("Consensus model {} failed: {}", model, e);
                    failures.push(format!("{model}: {e}"));
                }
                Err(e) => warn!("Consensus task failed: {}", e),
            }
        }
        if responses.is_empty() {
            return Err(EngineError::ExternalCallFailure(format!(
                "no consensus model answered ({})",
                failures.join("; ")
            )));
        }

        let run = self.parts.consensus.reconcile(decision, responses).await?;
        let mut proposal = run.verdict.final_proposal.clone();
        proposal.confidence = None;
        Ok(Obtained {
            proposal,
            attempts,
            latency_ms: started.elapsed().as_millis() as u64,
            consensus: Some(run),
        })
    }

    /// Turn an obtained proposal into the decision's selection.
    ///
    /// Errors are messages for the failed decision.
    fn adopt(
        &self,
        decision: &mut Decision,
        obtained: Obtained,
        pattern: Option<LearningPattern>,
    ) -> Result<(), String> {
        let mut proposal = obtained.proposal;
        let dropped = proposal.retain_known(&self.registry);
        if !dropped.is_empty() {
            warn!("Dropped unregistered tools: {}", dropped.join(", "));
        }

        let mut factors =
            DecisionFactors::assess(&decision.characteristics, &proposal, &self.registry);
        factors.dropped_tools = dropped;
        factors.llm_attempts = obtained.attempts;
        factors.llm_latency_ms = Some(obtained.latency_ms);
        let mut confidence = factors.resolve_confidence(&proposal);

        if let Some(run) = &obtained.consensus {
            let verdict = &run.verdict;
            confidence = verdict.consensus_confidence;
            factors.confidence_source = ConfidenceSource::Consensus;
            factors.consensus = Some(ConsensusSummary {
                run_id: run.id.clone(),
                reached: verdict.consensus_reached,
                confidence: verdict.consensus_confidence,
                models: verdict.models(),
            });
            decision.consensus_run = Some(run.id.clone());
            decision.needs_review = verdict.review_required || !verdict.consensus_reached;
        }

        if let Some(pattern) = pattern
            && pattern.score().value() >= self.execution.pattern_merge_floor
        {
            confidence = self.merge_pattern(&mut proposal, &mut factors, confidence, &pattern);
        }

        if proposal.tools.is_empty() {
            return Err("no registered tool was proposed".to_string());
        }
        if proposal.embedding_model.is_none() {
            proposal.embedding_model = Some(self.models.default_embedding.clone());
        }

        let expected = self.registry.expected_runtime_ms(&proposal.tools);
        decision
            .adopt_proposal(proposal, confidence, factors, expected)
            .map_err(|e| e.to_string())
    }

    /// Append the pattern's tools, fill gaps, and average confidences.
    fn merge_pattern(
        &self,
        proposal: &mut StrategyProposal,
        factors: &mut DecisionFactors,
        confidence: UnitScore,
        pattern: &LearningPattern,
    ) -> UnitScore {
        let recommendation = &pattern.recommendation;
        let mut tools_added = Vec::new();
        for tool in &recommendation.tools {
            if self.registry.contains(tool) && proposal.push_tool(tool.clone()) {
                tools_added.push(tool.clone());
            }
        }

        let filled_embedding_model =
            proposal.embedding_model.is_none() && recommendation.embedding_model.is_some();
        if filled_embedding_model {
            proposal.embedding_model = recommendation.embedding_model.clone();
        }
        let filled_strategy = proposal.strategy.trim().is_empty()
            && recommendation.strategy.as_ref().is_some_and(|s| !s.is_empty());
        if filled_strategy && let Some(strategy) = &recommendation.strategy {
            proposal.strategy = strategy.clone();
        }

        let score = pattern.score();
        let merged = UnitScore::saturating((confidence.value() + score.value()) / 2.0);
        debug!(
            "Merged pattern {} (score {}): +[{}], confidence {} -> {}",
            pattern.id,
            score,
            tools_added.join(", "),
            confidence,
            merged
        );
        factors.pattern_merge = Some(PatternMerge {
            pattern_id: pattern.id.clone(),
            pattern_version: pattern.version,
            pattern_score: score,
            confidence_before: confidence,
            tools_added,
            filled_embedding_model,
            filled_strategy,
        });
        merged
    }

    // ==================== Execute / Finalize ====================

    /// Run the chosen tools and finalize the decision.
    pub async fn execute(&self, decision_id: &DecisionId) -> Result<Decision, EngineError> {
        let decision = load_decision(self.decisions.as_ref(), decision_id).await?;
        if decision.is_terminal() {
            return Err(DomainError::AlreadyTerminal {
                entity: "decision",
                status: decision.status.to_string(),
            }
            .into());
        }

        let (status, message) = match self.parts.tracker.run(&decision).await {
            Ok(executions) => outcome_of(&decision, &executions),
            Err(e) => {
                warn!("Execution of {} aborted: {}", decision_id, e);
                (
                    DecisionStatus::Error,
                    Some(format!("tool execution aborted: {e}")),
                )
            }
        };
        self.finalize(decision_id, status, message).await
    }

    /// Move a running decision to a terminal status.
    ///
    /// Rejected while any of its tool executions is still running.
    pub async fn finalize(
        &self,
        decision_id: &DecisionId,
        status: DecisionStatus,
        error_message: Option<String>,
    ) -> Result<Decision, EngineError> {
        let current = load_decision(self.decisions.as_ref(), decision_id).await?;
        let mut decision = current.clone();
        decision.finalize(status, error_message)?;
        if !self.parts.tracker.all_terminal(decision_id).await? {
            return Err(EngineError::invalid(format!(
                "decision {decision_id} still has running tool executions"
            )));
        }

        decision.provenance = self
            .parts
            .provenance
            .revise(
                ActivityKind::DecisionFinalization,
                &self.actor,
                json!({ "decision": decision_id, "status": status.as_str() }),
                EntityKind::Decision,
                &decision,
                &current.provenance,
            )
            .await?;
        self.decisions.update(&decision).await?;
        info!("Decision {} finalized as {}", decision_id, status);
        Ok(decision)
    }

    /// Flag a terminal decision as validated, optionally correcting its runtime.
    pub async fn mark_validated(
        &self,
        decision_id: &DecisionId,
        actual_runtime_ms: Option<u64>,
    ) -> Result<Decision, EngineError> {
        let current = load_decision(self.decisions.as_ref(), decision_id).await?;
        let mut decision = current.clone();
        decision.mark_validated(actual_runtime_ms)?;
        decision.provenance = self
            .parts
            .provenance
            .revise(
                ActivityKind::DecisionFinalization,
                &self.actor,
                json!({ "decision": decision_id, "validated": true }),
                EntityKind::Decision,
                &decision,
                &current.provenance,
            )
            .await?;
        self.decisions.update(&decision).await?;
        Ok(decision)
    }

    /// Characteristics, proposal, execution and finalization of one document.
    pub async fn process_document(
        &self,
        document_id: &DocumentId,
        term: TermContext,
        goal: &str,
        experiment_id: Option<ExperimentId>,
    ) -> Result<Decision, EngineError> {
        let characteristics = self.documents.characteristics(document_id).await?;
        let decision = self
            .propose(ProposeInput::new(characteristics, term, goal).with_experiment(experiment_id))
            .await?;
        if decision.is_terminal() {
            return Ok(decision);
        }
        self.execute(&decision.id).await
    }

    /// Run `selection` as a new decision derived from `original`.
    ///
    /// No LLM is consulted; fields the selection leaves empty fall back to
    /// the engine defaults.
    pub async fn re_execute(
        &self,
        original: &Decision,
        selection: StrategyProposal,
        requested_by: &AgentId,
    ) -> Result<Decision, EngineError> {
        let input = ProposeInput::new(
            original.characteristics.clone(),
            TermContext::new(original.term.clone()),
            original.goal.clone(),
        )
        .with_experiment(original.experiment_id.clone());
        let params = json!({
            "derived_from": original.id,
            "requested_by": requested_by,
            "tools": selection.tools,
        });
        let (mut decision, activity) = self.open(&input, Some(original), params).await?;

        let mut proposal = selection;
        let dropped = proposal.retain_known(&self.registry);
        if proposal.tools.is_empty() {
            return self
                .finalize(
                    &decision.id,
                    DecisionStatus::Error,
                    Some("no registered tool in the selection".to_string()),
                )
                .await;
        }
        let mut factors =
            DecisionFactors::assess(&decision.characteristics, &proposal, &self.registry);
        factors.dropped_tools = dropped;
        let confidence = factors.resolve_confidence(&proposal);
        if proposal.embedding_model.is_none() {
            proposal.embedding_model = Some(self.models.default_embedding.clone());
        }
        let expected = self.registry.expected_runtime_ms(&proposal.tools);
        decision.adopt_proposal(proposal, confidence, factors, expected)?;
        self.store_revision(&mut decision, &activity).await?;

        info!("Re-executing {} as {}", original.id, decision.id);
        self.execute(&decision.id).await
    }

    // ==================== Queries ====================

    pub async fn decision(&self, id: &DecisionId) -> Result<Decision, EngineError> {
        load_decision(self.decisions.as_ref(), id).await
    }

    pub async fn decisions(&self, filter: &DecisionFilter) -> Result<Vec<Decision>, EngineError> {
        Ok(self.decisions.list(filter).await?)
    }

    pub async fn executions(&self, id: &DecisionId) -> Result<Vec<ToolExecution>, EngineError> {
        self.parts.tracker.executions(id).await
    }
}

/// Terminal status implied by a finished tool run.
fn outcome_of(decision: &Decision, executions: &[ToolExecution]) -> (DecisionStatus, Option<String>) {
    let incomplete = executions
        .iter()
        .any(|e| e.status() != ExecutionStatus::Completed);
    if incomplete && decision.deadline_passed(Utc::now()) {
        return (
            DecisionStatus::Timeout,
            Some("decision deadline passed during tool execution".to_string()),
        );
    }

    let failed: Vec<String> = executions
        .iter()
        .filter(|e| e.status().is_failure())
        .map(|e| format!("{} ({})", e.tool_name, e.status()))
        .collect();
    if failed.is_empty() {
        (DecisionStatus::Completed, None)
    } else {
        (
            DecisionStatus::Error,
            Some(format!("tool(s) failed: {}", failed.join(", "))),
        )
    }
}

/// Ask one model for a proposal, retrying failures.
///
/// Returns the proposal and the number of attempts used.
async fn ask_model(
    gateway: Arc<dyn LlmGateway>,
    model: Model,
    prompt: String,
    retries: u32,
) -> Result<(StrategyProposal, u32), GatewayError> {
    let mut last_error = GatewayError::Other("no attempt made".to_string());
    let max_attempts = retries.saturating_add(1);
    for attempt in 1..=max_attempts {
        match ask_once(gateway.as_ref(), &model, &prompt).await {
            Ok(proposal) => return Ok((proposal, attempt)),
            Err(e) => {
                warn!("Proposal attempt {}/{} with {} failed: {}", attempt, max_attempts, model, e);
                last_error = e;
                if attempt < max_attempts {
                    tokio::time::sleep(LLM_RETRY_BACKOFF * attempt).await;
                }
            }
        }
    }
    Err(last_error)
}

/// One session: the proposal prompt, then a format reminder if unreadable.
async fn ask_once(
    gateway: &dyn LlmGateway,
    model: &Model,
    prompt: &str,
) -> Result<StrategyProposal, GatewayError> {
    let session = gateway
        .create_session_with_system_prompt(model, PromptTemplate::proposal_system())
        .await?;
    let response = session.send(prompt).await?;
    if let Some(proposal) = parse_strategy_proposal(&response) {
        return Ok(proposal);
    }

    debug!("Unreadable proposal from {}, sending format reminder", model);
    let response = session.send(&PromptTemplate::format_reminder()).await?;
    parse_strategy_proposal(&response)
        .ok_or_else(|| GatewayError::Other(format!("{model} returned no readable proposal")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use semantra_domain::learning::{PatternRecommendation, SeedSource};
    use semantra_domain::{
        Agent, AgentKind, ConsensusPolicy, EmbeddingModel, FeedbackId, LearningPolicy,
        PatternSeed, PatternStatus,
    };

    struct Fixture {
        repos: Arc<MemoryRepos>,
        orchestrator: DecisionOrchestrator,
    }

    async fn fixture(gateway: ScriptedGateway, invoker: ScriptedInvoker, config: EngineConfig) -> Fixture {
        fixture_with_registry(gateway, invoker, config, registry()).await
    }

    async fn fixture_with_registry(
        gateway: ScriptedGateway,
        invoker: ScriptedInvoker,
        config: EngineConfig,
        tools: ToolRegistry,
    ) -> Fixture {
        let repos = Arc::new(MemoryRepos::default());
        let stores = repos.stores();
        let provenance = ProvenanceRecorder::new(Arc::new(MemoryLedger::default()));
        let actor = AgentId::new("agt-engine");
        let agents = Arc::new(AgentRegistry::new(stores.agents.clone()));
        agents
            .ensure(Agent::new(AgentKind::software("semantra", "test")).with_id(actor.clone()))
            .await
            .unwrap();
        let registry = Arc::new(tools);
        let parts = Collaborators {
            tracker: Arc::new(ToolExecutionTracker::new(
                stores.executions.clone(),
                stores.decisions.clone(),
                Arc::new(invoker),
                provenance.clone(),
                registry.clone(),
                &config.execution,
                actor.clone(),
            )),
            learner: Arc::new(PatternLearner::new(
                stores.patterns.clone(),
                provenance.clone(),
                LearningPolicy::default(),
                actor.clone(),
            )),
            consensus: Arc::new(ConsensusValidator::new(
                stores.consensus.clone(),
                provenance.clone(),
                ConsensusPolicy::default(),
                actor.clone(),
            )),
            agents,
            provenance,
        };
        let orchestrator = DecisionOrchestrator::new(
            Arc::new(gateway),
            Arc::new(StaticDocuments::default().with(characteristics("doc-1"))),
            stores.decisions.clone(),
            registry,
            parts,
            &config,
            actor,
        );
        Fixture { repos, orchestrator }
    }

    fn input() -> ProposeInput {
        ProposeInput::new(characteristics("doc-1"), TermContext::new("broadcast"), "track drift")
    }

    fn fast_retries() -> EngineConfig {
        EngineConfig::default().with_execution(ExecutionParams::default().with_max_llm_retries(1))
    }

    #[tokio::test]
    async fn test_propose_uses_reported_confidence_and_drops_unknown_tools() {
        let gateway = ScriptedGateway::new().respond(
            Model::default(),
            proposal_json(&["A", "B", "Z"], "contextual", 0.85),
        );
        let f = fixture(gateway, ScriptedInvoker::new(), EngineConfig::default()).await;

        let decision = f.orchestrator.propose(input()).await.unwrap();

        assert_eq!(decision.status, DecisionStatus::Running);
        assert_eq!(decision.tools, vec!["A", "B"]);
        assert_eq!(decision.confidence.value(), 0.85);
        assert_eq!(decision.embedding_model, EmbeddingModel::MacBerth);
        assert_eq!(decision.factors.dropped_tools, vec!["Z"]);
        assert_eq!(decision.factors.confidence_source, ConfidenceSource::ModelReported);
        assert_eq!(decision.factors.llm_attempts, 1);
        assert!(decision.provenance.is_recorded());
    }

    #[tokio::test]
    async fn test_missing_confidence_is_computed() {
        let gateway = ScriptedGateway::new().respond(
            Model::default(),
            r#"```json
{"tools": ["A"], "strategy": "contextual"}
```"#,
        );
        let f = fixture(gateway, ScriptedInvoker::new(), EngineConfig::default()).await;

        let decision = f.orchestrator.propose(input()).await.unwrap();

        assert_eq!(decision.factors.confidence_source, ConfidenceSource::Computed);
        assert_eq!(decision.confidence, decision.factors.computed_confidence());
        assert!((0.0..=1.0).contains(&decision.confidence.value()));
    }

    #[tokio::test]
    async fn test_llm_failure_finalizes_error() {
        let gateway = ScriptedGateway::new()
            .fail(Model::default(), "503")
            .fail(Model::default(), "503");
        let f = fixture(gateway, ScriptedInvoker::new(), fast_retries()).await;

        let decision = f.orchestrator.propose(input()).await.unwrap();

        assert_eq!(decision.status, DecisionStatus::Error);
        assert!(decision.error_message.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_unreadable_answer_gets_a_reminder() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), "I would use some tools.")
            .respond(Model::default(), proposal_json(&["A"], "contextual", 0.7));
        let f = fixture(gateway, ScriptedInvoker::new(), EngineConfig::default()).await;

        let decision = f.orchestrator.propose(input()).await.unwrap();

        assert_eq!(decision.status, DecisionStatus::Running);
        assert_eq!(decision.factors.llm_attempts, 1);
    }

    #[tokio::test]
    async fn test_slow_llm_times_out() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A"], "contextual", 0.7))
            .with_delay(Duration::from_secs(5));
        let config = EngineConfig::default().with_execution(
            ExecutionParams::default().with_decision_deadline(Duration::from_millis(50)),
        );
        let f = fixture(gateway, ScriptedInvoker::new(), config).await;

        let decision = f.orchestrator.propose(input()).await.unwrap();

        assert_eq!(decision.status, DecisionStatus::Timeout);
        assert!(decision.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_registry_is_rejected() {
        let f = fixture_with_registry(
            ScriptedGateway::new(),
            ScriptedInvoker::new(),
            EngineConfig::default(),
            ToolRegistry::new(),
        )
        .await;

        let err = f.orchestrator.propose(input()).await.unwrap_err();
        assert_eq!(err, EngineError::Validation(DomainError::NoToolsAvailable));
    }

    #[tokio::test]
    async fn test_only_unknown_tools_is_an_error() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["Z"], "contextual", 0.7));
        let f = fixture(gateway, ScriptedInvoker::new(), EngineConfig::default()).await;

        let decision = f.orchestrator.propose(input()).await.unwrap();

        assert_eq!(decision.status, DecisionStatus::Error);
        assert!(decision.error_message.unwrap().contains("no registered tool"));
    }

    #[tokio::test]
    async fn test_pattern_is_merged() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A"], "contextual", 0.6));
        let f = fixture(gateway, ScriptedInvoker::new(), EngineConfig::default()).await;
        let seed = PatternSeed {
            source: SeedSource::Feedback(FeedbackId::generate()),
            decision_id: DecisionId::generate(),
            signature: ContextSignature::from_characteristics(&characteristics("doc-1")),
            success: true,
            confidence: UnitScore::saturating(1.0),
            recommendation: PatternRecommendation {
                tools: vec!["B".into(), "Z".into()],
                embedding_model: None,
                strategy: None,
            },
            applied_pattern: None,
        };
        let mut pattern = LearningPattern::from_seed(&seed, ProvenanceLink::pending("act".into()));
        pattern.status = PatternStatus::Active;
        f.repos.put_pattern(pattern.clone());

        let decision = f.orchestrator.propose(input()).await.unwrap();

        assert_eq!(decision.tools, vec!["A", "B"]);
        assert!((decision.confidence.value() - 0.8).abs() < 1e-9);
        let merge = decision.factors.pattern_merge.as_ref().unwrap();
        assert_eq!(merge.pattern_id, pattern.id);
        assert_eq!(merge.tools_added, vec!["B"]);
        assert_eq!(merge.confidence_before.value(), 0.6);
        assert_eq!(decision.applied_pattern(), Some(&pattern.id));
    }

    #[tokio::test]
    async fn test_consensus_picks_leader() {
        let gateway = ScriptedGateway::new()
            .respond(Model::Qwen25, proposal_json(&["A", "B"], "contextual", 0.8))
            .respond(Model::Mistral, proposal_json(&["A", "B"], "contextual", 0.9));
        let mut config = EngineConfig::default();
        config.models.consensus = vec![Model::Qwen25, Model::Mistral];
        let f = fixture(gateway, ScriptedInvoker::new(), config).await;

        let decision = f.orchestrator.propose(input()).await.unwrap();

        assert_eq!(decision.status, DecisionStatus::Running);
        assert!(decision.consensus_run.is_some());
        assert!(!decision.needs_review);
        assert_eq!(decision.factors.confidence_source, ConfidenceSource::Consensus);
        assert!(decision.factors.consensus.unwrap().reached);
    }

    #[tokio::test]
    async fn test_unavailable_models_lists_unscripted() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A"], "contextual", 0.8))
            .respond(Model::Qwen25, proposal_json(&["A"], "contextual", 0.8));
        let mut config = EngineConfig::default();
        config.models.consensus = vec![Model::Qwen25, Model::Gemma3, Model::default()];
        let f = fixture(gateway, ScriptedInvoker::new(), config).await;

        let missing = f.orchestrator.unavailable_models().await.unwrap();

        assert_eq!(missing, vec![Model::Gemma3]);
    }

    #[tokio::test]
    async fn test_consensus_disagreement_needs_review() {
        let gateway = ScriptedGateway::new()
            .respond(Model::Qwen25, proposal_json(&["A"], "contextual", 0.8))
            .respond(Model::Mistral, proposal_json(&["B", "C"], "diachronic", 0.9));
        let mut config = EngineConfig::default();
        config.models.consensus = vec![Model::Qwen25, Model::Mistral];
        let f = fixture(gateway, ScriptedInvoker::new(), config).await;

        let decision = f.orchestrator.propose(input()).await.unwrap();

        assert!(decision.needs_review);
        assert!(!decision.tools.is_empty());
    }

    #[tokio::test]
    async fn test_process_document_completes() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A", "B"], "contextual", 0.85));
        let f = fixture(gateway, ScriptedInvoker::new(), EngineConfig::default()).await;

        let decision = f
            .orchestrator
            .process_document(&DocumentId::new("doc-1"), TermContext::new("broadcast"), "drift", None)
            .await
            .unwrap();

        assert_eq!(decision.status, DecisionStatus::Completed);
        assert!(decision.actual_runtime_ms.is_some());
        assert_eq!(f.orchestrator.executions(&decision.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_decision_deadline_cuts_tool_run() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A", "B"], "contextual", 0.85));
        let invoker = ScriptedInvoker::new().slow("A", Duration::from_secs(2));
        let config = EngineConfig::default().with_execution(
            ExecutionParams::default()
                .with_decision_deadline(Duration::from_millis(300))
                .with_tool_timeout(Duration::from_secs(10)),
        );
        let f = fixture(gateway, invoker, config).await;

        let started = Instant::now();
        let decision = f.orchestrator.propose(input()).await.unwrap();
        let decision = f.orchestrator.execute(&decision.id).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(decision.status, DecisionStatus::Timeout);
        assert!(decision.error_message.unwrap().contains("deadline"));
        let executions = f.orchestrator.executions(&decision.id).await.unwrap();
        let statuses: Vec<_> = executions.iter().map(|e| e.status()).collect();
        assert_eq!(statuses, vec![ExecutionStatus::Timeout, ExecutionStatus::Skipped]);
    }

    #[tokio::test]
    async fn test_storage_failure_during_run_finalizes_error() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A", "B"], "contextual", 0.85));
        let f = fixture(gateway, ScriptedInvoker::new(), EngineConfig::default()).await;

        let decision = f.orchestrator.propose(input()).await.unwrap();
        f.repos.fail_execution_updates(1);
        let decision = f.orchestrator.execute(&decision.id).await.unwrap();

        assert_eq!(decision.status, DecisionStatus::Error);
        assert!(
            decision
                .error_message
                .unwrap()
                .contains("tool execution aborted")
        );
        let executions = f.orchestrator.executions(&decision.id).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status(), ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn test_failed_tool_makes_decision_error() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A", "B"], "contextual", 0.85));
        let invoker = ScriptedInvoker::new().failure("A", "boom").failure("A", "boom");
        let f = fixture(gateway, invoker, EngineConfig::default()).await;

        let decision = f.orchestrator.propose(input()).await.unwrap();
        let decision = f.orchestrator.execute(&decision.id).await.unwrap();

        assert_eq!(decision.status, DecisionStatus::Error);
        assert!(decision.error_message.unwrap().contains("A (error)"));
    }

    #[tokio::test]
    async fn test_finalize_rules() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A"], "contextual", 0.85));
        let f = fixture(gateway, ScriptedInvoker::new(), EngineConfig::default()).await;
        let decision = f.orchestrator.propose(input()).await.unwrap();

        let err = f
            .orchestrator
            .finalize(&decision.id, DecisionStatus::Running, None)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let execution = f
            .orchestrator
            .tracker()
            .record_execution(&decision.id, "A", 1)
            .await
            .unwrap();
        let err = f
            .orchestrator
            .finalize(&decision.id, DecisionStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = f.orchestrator.mark_validated(&decision.id, None).await.unwrap_err();
        assert!(err.is_validation());

        f.orchestrator.tracker().complete(&execution.id, "ok", 0.9).await.unwrap();
        f.orchestrator
            .finalize(&decision.id, DecisionStatus::Completed, None)
            .await
            .unwrap();
        let err = f
            .orchestrator
            .finalize(&decision.id, DecisionStatus::Error, None)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let validated = f.orchestrator.mark_validated(&decision.id, Some(1234)).await.unwrap();
        assert!(validated.validated);
        assert_eq!(validated.actual_runtime_ms, Some(1234));
        assert_eq!(validated.status, DecisionStatus::Completed);
    }

    #[tokio::test]
    async fn test_re_execute_derives_from_original() {
        let gateway = ScriptedGateway::new()
            .respond(Model::default(), proposal_json(&["A"], "contextual", 0.85));
        let f = fixture(gateway, ScriptedInvoker::new(), EngineConfig::default()).await;
        let original = f.orchestrator.propose(input()).await.unwrap();
        let original = f.orchestrator.execute(&original.id).await.unwrap();

        let derived = f
            .orchestrator
            .re_execute(
                &original,
                StrategyProposal::new(vec!["B".into()], "diachronic"),
                &AgentId::new("agt-ada"),
            )
            .await
            .unwrap();

        assert_eq!(derived.derived_from, Some(original.id.clone()));
        assert_eq!(derived.tools, vec!["B"]);
        assert_eq!(derived.status, DecisionStatus::Completed);
        assert_ne!(derived.id, original.id);
    }
}
