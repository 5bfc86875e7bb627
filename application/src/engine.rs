//! Engine facade
//!
//! Wires the use cases around one set of ports so callers construct the
//! engine once and reach every component through it.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ports::document_service::DocumentService;
use crate::ports::llm_gateway::LlmGateway;
use crate::ports::provenance_ledger::ProvenanceLedger;
use crate::ports::tool_invoker::ToolInvoker;
use crate::use_cases::agent_registry::AgentRegistry;
use crate::use_cases::consensus::ConsensusValidator;
use crate::use_cases::feedback::FeedbackCollector;
use crate::use_cases::orchestrator::{Collaborators, DecisionOrchestrator};
use crate::use_cases::overrides::OverrideManager;
use crate::use_cases::pattern_learner::PatternLearner;
use crate::use_cases::provenance::ProvenanceRecorder;
use crate::use_cases::run_experiment::ExperimentRunner;
use crate::use_cases::shared::Stores;
use crate::use_cases::tool_tracker::ToolExecutionTracker;
use semantra_domain::{Agent, AgentId, AgentKind, ToolRegistry};
use std::sync::Arc;
use tracing::debug;

/// Adapters the engine runs on.
pub struct EngineDeps {
    pub gateway: Arc<dyn LlmGateway>,
    pub documents: Arc<dyn DocumentService>,
    pub invoker: Arc<dyn ToolInvoker>,
    pub ledger: Arc<dyn ProvenanceLedger>,
    pub stores: Stores,
    pub tools: ToolRegistry,
}

pub struct Engine {
    config: EngineConfig,
    actor: AgentId,
    stores: Stores,
    provenance: ProvenanceRecorder,
    agents: Arc<AgentRegistry>,
    learner: Arc<PatternLearner>,
    consensus: Arc<ConsensusValidator>,
    orchestrator: Arc<DecisionOrchestrator>,
    feedback: FeedbackCollector,
    overrides: OverrideManager,
    experiments: ExperimentRunner,
}

impl Engine {
    /// Id the engine records its own activities under.
    pub const AGENT_ID: &'static str = "agt-semantra";

    /// Build every component and register the engine's software agent.
    pub async fn start(deps: EngineDeps, config: EngineConfig) -> Result<Self, EngineError> {
        let stores = deps.stores;
        let actor = AgentId::new(Self::AGENT_ID);
        let agents = Arc::new(AgentRegistry::new(stores.agents.clone()));
        agents
            .ensure(
                Agent::new(AgentKind::software("semantra", env!("CARGO_PKG_VERSION")))
                    .with_id(actor.clone()),
            )
            .await?;

        let provenance = ProvenanceRecorder::new(deps.ledger);
        let registry = Arc::new(deps.tools);
        let learner = Arc::new(
            PatternLearner::new(
                stores.patterns.clone(),
                provenance.clone(),
                config.learning.clone(),
                actor.clone(),
            )
            .with_max_conflict_retries(config.execution.max_conflict_retries),
        );
        let consensus = Arc::new(ConsensusValidator::new(
            stores.consensus.clone(),
            provenance.clone(),
            config.consensus.clone(),
            actor.clone(),
        ));
        let tracker = Arc::new(ToolExecutionTracker::new(
            stores.executions.clone(),
            stores.decisions.clone(),
            deps.invoker,
            provenance.clone(),
            registry.clone(),
            &config.execution,
            actor.clone(),
        ));
        let orchestrator = Arc::new(DecisionOrchestrator::new(
            deps.gateway,
            deps.documents.clone(),
            stores.decisions.clone(),
            registry,
            Collaborators {
                tracker,
                learner: learner.clone(),
                consensus: consensus.clone(),
                agents: agents.clone(),
                provenance: provenance.clone(),
            },
            &config,
            actor.clone(),
        ));
        let feedback = FeedbackCollector::new(
            stores.feedback.clone(),
            stores.decisions.clone(),
            agents.clone(),
            learner.clone(),
            provenance.clone(),
            actor.clone(),
        );
        let overrides = OverrideManager::new(
            stores.overrides.clone(),
            stores.decisions.clone(),
            orchestrator.clone(),
            learner.clone(),
            agents.clone(),
            provenance.clone(),
        );
        let experiments = ExperimentRunner::new(
            orchestrator.clone(),
            stores.experiments.clone(),
            deps.documents,
            provenance.clone(),
            config.execution.worker_pool_size,
            actor.clone(),
        );

        debug!(
            "Engine started (proposal model {}, {} consensus model(s))",
            config.models.proposal,
            config.models.consensus.len()
        );
        Ok(Self {
            config,
            actor,
            stores,
            provenance,
            agents,
            learner,
            consensus,
            orchestrator,
            feedback,
            overrides,
            experiments,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn actor(&self) -> &AgentId {
        &self.actor
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn provenance(&self) -> &ProvenanceRecorder {
        &self.provenance
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn learner(&self) -> &PatternLearner {
        &self.learner
    }

    pub fn consensus(&self) -> &ConsensusValidator {
        &self.consensus
    }

    pub fn orchestrator(&self) -> &DecisionOrchestrator {
        &self.orchestrator
    }

    pub fn tracker(&self) -> &ToolExecutionTracker {
        self.orchestrator.tracker()
    }

    pub fn feedback(&self) -> &FeedbackCollector {
        &self.feedback
    }

    pub fn overrides(&self) -> &OverrideManager {
        &self.overrides
    }

    pub fn experiments(&self) -> &ExperimentRunner {
        &self.experiments
    }
}
