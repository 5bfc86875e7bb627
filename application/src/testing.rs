//! In-memory fakes shared by the use case tests.

use crate::ports::document_service::{DocumentError, DocumentService};
use crate::ports::llm_gateway::{GatewayError, LlmGateway, LlmSession};
use crate::ports::provenance_ledger::{LedgerError, ProvenanceLedger};
use crate::ports::repository::*;
use crate::ports::tool_invoker::{ToolInvocationError, ToolInvoker, ToolOutput, ToolRequest};
use crate::use_cases::shared::Stores;
use async_trait::async_trait;
use chrono::Utc;
use semantra_domain::*;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==================== Ledger ====================

#[derive(Default)]
pub struct MemoryLedger {
    activities: Mutex<HashMap<ActivityId, Activity>>,
    entities: Mutex<HashMap<EntityId, ProvEntity>>,
}

impl MemoryLedger {
    pub fn activity_count(&self) -> usize {
        self.activities.lock().unwrap().len()
    }
}

#[async_trait]
impl ProvenanceLedger for MemoryLedger {
    async fn record_activity(
        &self,
        kind: ActivityKind,
        actor: &AgentId,
        params: Value,
    ) -> Result<ActivityId, LedgerError> {
        let id = ActivityId::generate();
        self.activities.lock().unwrap().insert(
            id.clone(),
            Activity {
                id: id.clone(),
                kind,
                actor: actor.clone(),
                params,
                recorded_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn record_entity(
        &self,
        kind: EntityKind,
        value: Value,
        generated_by: &ActivityId,
        derived_from: &[EntityId],
    ) -> Result<EntityId, LedgerError> {
        if !self.activities.lock().unwrap().contains_key(generated_by) {
            return Err(LedgerError::UnknownActivity(generated_by.to_string()));
        }
        let id = EntityId::generate();
        self.entities.lock().unwrap().insert(
            id.clone(),
            ProvEntity {
                id: id.clone(),
                kind,
                value,
                generated_by: generated_by.clone(),
                derived_from: derived_from.to_vec(),
                recorded_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn activity(&self, id: &ActivityId) -> Result<Option<Activity>, LedgerError> {
        Ok(self.activities.lock().unwrap().get(id).cloned())
    }

    async fn entity(&self, id: &EntityId) -> Result<Option<ProvEntity>, LedgerError> {
        Ok(self.entities.lock().unwrap().get(id).cloned())
    }
}

// ==================== Repositories ====================

/// All tables behind plain mutexes.
#[derive(Default)]
pub struct MemoryRepos {
    decisions: Mutex<HashMap<DecisionId, Decision>>,
    executions: Mutex<HashMap<ExecutionId, ToolExecution>>,
    feedback: Mutex<HashMap<FeedbackId, Feedback>>,
    overrides: Mutex<HashMap<OverrideId, DecisionOverride>>,
    patterns: Mutex<HashMap<PatternId, LearningPattern>>,
    consensus: Mutex<HashMap<ConsensusRunId, ConsensusRun>>,
    agents: Mutex<HashMap<AgentId, Agent>>,
    experiments: Mutex<HashMap<ExperimentId, ExperimentRun>>,
    /// Pending forced CAS conflicts for the pattern table.
    forced_conflicts: AtomicU32,
    /// Pending forced storage errors for tool execution updates.
    failing_execution_updates: AtomicU32,
}

impl MemoryRepos {
    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            decisions: self.clone(),
            executions: self.clone(),
            feedback: self.clone(),
            overrides: self.clone(),
            patterns: self.clone(),
            consensus: self.clone(),
            agents: self.clone(),
            experiments: self.clone(),
        }
    }

    /// Make the next `n` pattern compare-and-swap calls lose the race.
    pub fn force_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` tool execution updates fail with a storage error.
    pub fn fail_execution_updates(&self, n: u32) {
        self.failing_execution_updates.store(n, Ordering::SeqCst);
    }

    pub fn put_pattern(&self, pattern: LearningPattern) {
        self.patterns
            .lock()
            .unwrap()
            .insert(pattern.id.clone(), pattern);
    }
}

fn insert_unique<K: std::hash::Hash + Eq + Clone + ToString, V: Clone>(
    table: &Mutex<HashMap<K, V>>,
    kind: &'static str,
    key: &K,
    value: &V,
) -> Result<(), RepositoryError> {
    let mut table = table.lock().unwrap();
    if table.contains_key(key) {
        return Err(RepositoryError::duplicate(kind, key.to_string()));
    }
    table.insert(key.clone(), value.clone());
    Ok(())
}

fn replace<K: std::hash::Hash + Eq + Clone + ToString, V: Clone>(
    table: &Mutex<HashMap<K, V>>,
    kind: &'static str,
    key: &K,
    value: &V,
) -> Result<(), RepositoryError> {
    let mut table = table.lock().unwrap();
    let Some(slot) = table.get_mut(key) else {
        return Err(RepositoryError::not_found(kind, key.to_string()));
    };
    *slot = value.clone();
    Ok(())
}

#[async_trait]
impl DecisionRepository for MemoryRepos {
    async fn insert(&self, d: &Decision) -> Result<(), RepositoryError> {
        insert_unique(&self.decisions, "decision", &d.id, d)
    }
    async fn update(&self, d: &Decision) -> Result<(), RepositoryError> {
        replace(&self.decisions, "decision", &d.id, d)
    }
    async fn get(&self, id: &DecisionId) -> Result<Option<Decision>, RepositoryError> {
        Ok(self.decisions.lock().unwrap().get(id).cloned())
    }
    async fn list(&self, filter: &DecisionFilter) -> Result<Vec<Decision>, RepositoryError> {
        let mut out: Vec<_> = self
            .decisions
            .lock()
            .unwrap()
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        out.sort_by_key(|d| d.started_at);
        Ok(out)
    }
}

#[async_trait]
impl ToolExecutionRepository for MemoryRepos {
    async fn insert(&self, e: &ToolExecution) -> Result<(), RepositoryError> {
        let mut table = self.executions.lock().unwrap();
        if table.values().any(|x| {
            x.decision_id == e.decision_id && x.execution_order == e.execution_order
        }) {
            return Err(RepositoryError::duplicate(
                "tool execution",
                format!("{}#{}", e.decision_id, e.execution_order),
            ));
        }
        table.insert(e.id.clone(), e.clone());
        Ok(())
    }
    async fn update(&self, e: &ToolExecution) -> Result<(), RepositoryError> {
        let forced = self
            .failing_execution_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return Err(RepositoryError::Storage("disk unavailable".to_string()));
        }
        replace(&self.executions, "tool execution", &e.id, e)
    }
    async fn get(&self, id: &ExecutionId) -> Result<Option<ToolExecution>, RepositoryError> {
        Ok(self.executions.lock().unwrap().get(id).cloned())
    }
    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<ToolExecution>, RepositoryError> {
        let mut out: Vec<_> = self
            .executions
            .lock()
            .unwrap()
            .values()
            .filter(|e| &e.decision_id == decision)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.execution_order);
        Ok(out)
    }
}

#[async_trait]
impl FeedbackRepository for MemoryRepos {
    async fn insert(&self, f: &Feedback) -> Result<(), RepositoryError> {
        insert_unique(&self.feedback, "feedback", &f.id, f)
    }
    async fn update(&self, f: &Feedback) -> Result<(), RepositoryError> {
        replace(&self.feedback, "feedback", &f.id, f)
    }
    async fn get(&self, id: &FeedbackId) -> Result<Option<Feedback>, RepositoryError> {
        Ok(self.feedback.lock().unwrap().get(id).cloned())
    }
    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<Feedback>, RepositoryError> {
        Ok(self
            .feedback
            .lock()
            .unwrap()
            .values()
            .filter(|f| &f.decision_id == decision)
            .cloned()
            .collect())
    }
    async fn list(&self, status: Option<FeedbackStatus>) -> Result<Vec<Feedback>, RepositoryError> {
        Ok(self
            .feedback
            .lock()
            .unwrap()
            .values()
            .filter(|f| status.is_none_or(|s| f.status == s))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OverrideRepository for MemoryRepos {
    async fn insert(&self, o: &DecisionOverride) -> Result<(), RepositoryError> {
        insert_unique(&self.overrides, "override", &o.id, o)
    }
    async fn update(&self, o: &DecisionOverride) -> Result<(), RepositoryError> {
        replace(&self.overrides, "override", &o.id, o)
    }
    async fn get(&self, id: &OverrideId) -> Result<Option<DecisionOverride>, RepositoryError> {
        Ok(self.overrides.lock().unwrap().get(id).cloned())
    }
    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<DecisionOverride>, RepositoryError> {
        Ok(self
            .overrides
            .lock()
            .unwrap()
            .values()
            .filter(|o| &o.decision_id == decision)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PatternRepository for MemoryRepos {
    async fn insert(&self, p: &LearningPattern) -> Result<LearningPattern, RepositoryError> {
        let mut stored = p.clone();
        stored.version = 1;
        insert_unique(&self.patterns, "learning pattern", &p.id, &stored)?;
        Ok(stored)
    }
    async fn insert_if_absent(
        &self,
        p: &LearningPattern,
    ) -> Result<LearningPattern, RepositoryError> {
        tokio::task::yield_now().await;
        let mut table = self.patterns.lock().unwrap();
        if let Some(winner) = table
            .values()
            .find(|w| w.status.is_live() && w.signature.covers(&p.signature))
        {
            return Err(RepositoryError::VersionConflict {
                id: winner.id.to_string(),
                expected: 0,
                actual: winner.version,
            });
        }
        let mut stored = p.clone();
        stored.version = 1;
        table.insert(p.id.clone(), stored.clone());
        Ok(stored)
    }
    async fn get(&self, id: &PatternId) -> Result<Option<LearningPattern>, RepositoryError> {
        Ok(self.patterns.lock().unwrap().get(id).cloned())
    }
    async fn list(&self) -> Result<Vec<LearningPattern>, RepositoryError> {
        Ok(self.patterns.lock().unwrap().values().cloned().collect())
    }
    async fn compare_and_swap(
        &self,
        p: &LearningPattern,
        expected_version: u64,
    ) -> Result<LearningPattern, RepositoryError> {
        // Yield so concurrent learners interleave between read and write.
        tokio::task::yield_now().await;
        let mut table = self.patterns.lock().unwrap();
        let Some(current) = table.get_mut(&p.id) else {
            return Err(RepositoryError::not_found("learning pattern", &p.id));
        };
        let forced = self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced || current.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                id: p.id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }
        let mut stored = p.clone();
        stored.version = expected_version + 1;
        *current = stored.clone();
        Ok(stored)
    }
}

#[async_trait]
impl ConsensusRepository for MemoryRepos {
    async fn insert(&self, r: &ConsensusRun) -> Result<(), RepositoryError> {
        insert_unique(&self.consensus, "consensus run", &r.id, r)
    }
    async fn get(&self, id: &ConsensusRunId) -> Result<Option<ConsensusRun>, RepositoryError> {
        Ok(self.consensus.lock().unwrap().get(id).cloned())
    }
    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<ConsensusRun>, RepositoryError> {
        Ok(self
            .consensus
            .lock()
            .unwrap()
            .values()
            .filter(|r| &r.decision_id == decision)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AgentRepository for MemoryRepos {
    async fn insert(&self, a: &Agent) -> Result<(), RepositoryError> {
        insert_unique(&self.agents, "agent", &a.id, a)
    }
    async fn get(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.agents.lock().unwrap().get(id).cloned())
    }
    async fn list(&self) -> Result<Vec<Agent>, RepositoryError> {
        Ok(self.agents.lock().unwrap().values().cloned().collect())
    }
    async fn adjust_references(&self, id: &AgentId, delta: i64) -> Result<Agent, RepositoryError> {
        let mut table = self.agents.lock().unwrap();
        let Some(agent) = table.get_mut(id) else {
            return Err(RepositoryError::not_found("agent", id));
        };
        agent.reference_count = agent.reference_count.saturating_add_signed(delta);
        Ok(agent.clone())
    }
}

#[async_trait]
impl ExperimentRepository for MemoryRepos {
    async fn insert(&self, r: &ExperimentRun) -> Result<(), RepositoryError> {
        insert_unique(&self.experiments, "experiment", &r.id, r)
    }
    async fn update(&self, r: &ExperimentRun) -> Result<(), RepositoryError> {
        replace(&self.experiments, "experiment", &r.id, r)
    }
    async fn get(&self, id: &ExperimentId) -> Result<Option<ExperimentRun>, RepositoryError> {
        Ok(self.experiments.lock().unwrap().get(id).cloned())
    }
    async fn list(&self) -> Result<Vec<ExperimentRun>, RepositoryError> {
        Ok(self.experiments.lock().unwrap().values().cloned().collect())
    }
}

// ==================== Gateway ====================

type Script = Arc<Mutex<VecDeque<Result<String, GatewayError>>>>;

/// Gateway replaying canned responses per model.
///
/// A model with an empty script answers with a connection error.
#[derive(Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<Model, Script>>,
    delay: Option<Duration>,
    sends: Arc<AtomicU32>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, model: Model, response: impl Into<String>) -> Self {
        self.push(model, Ok(response.into()))
    }

    pub fn fail(self, model: Model, message: &str) -> Self {
        self.push(model, Err(GatewayError::RequestFailed(message.to_string())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, model: Model, item: Result<String, GatewayError>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(model)
            .or_default()
            .lock()
            .unwrap()
            .push_back(item);
        self
    }

    pub fn sends(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }
}

struct ScriptedSession {
    model: Model,
    script: Script,
    delay: Option<Duration>,
    sends: Arc<AtomicU32>,
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn create_session_with_system_prompt(
        &self,
        model: &Model,
        _system_prompt: &str,
    ) -> Result<Box<dyn LlmSession>, GatewayError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .entry(model.clone())
            .or_default()
            .clone();
        Ok(Box::new(ScriptedSession {
            model: model.clone(),
            script,
            delay: self.delay,
            sends: self.sends.clone(),
        }))
    }

    async fn available_models(&self) -> Result<Vec<Model>, GatewayError> {
        Ok(self.scripts.lock().unwrap().keys().cloned().collect())
    }
}

#[async_trait]
impl LlmSession for ScriptedSession {
    fn model(&self) -> &Model {
        &self.model
    }

    async fn send(&self, _content: &str) -> Result<String, GatewayError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::ConnectionError("script exhausted".into())))
    }
}

// ==================== Tools ====================

/// Invoker answering from per-tool scripts, falling back to a fixed output.
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Result<ToolOutput, ToolInvocationError>>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(self, tool: &str, summary: &str, quality: f64) -> Self {
        self.push(
            tool,
            Ok(ToolOutput {
                summary: summary.to_string(),
                quality,
            }),
        )
    }

    pub fn failure(self, tool: &str, message: &str) -> Self {
        self.push(tool, Err(ToolInvocationError::Failed(message.to_string())))
    }

    pub fn slow(self, tool: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(tool.to_string(), delay);
        self
    }

    fn push(self, tool: &str, item: Result<ToolOutput, ToolInvocationError>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(tool.to_string())
            .or_default()
            .push_back(item);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolInvoker for ScriptedInvoker {
    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput, ToolInvocationError> {
        self.calls.lock().unwrap().push(request.tool.clone());
        let delay = self.delays.lock().unwrap().get(&request.tool).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.tool)
            .and_then(|q| q.pop_front());
        scripted.unwrap_or_else(|| {
            Ok(ToolOutput {
                summary: format!("{} ran on {}", request.tool, request.document_id),
                quality: 0.8,
            })
        })
    }
}

// ==================== Documents ====================

#[derive(Default)]
pub struct StaticDocuments {
    documents: HashMap<DocumentId, DocumentCharacteristics>,
}

impl StaticDocuments {
    pub fn with(mut self, characteristics: DocumentCharacteristics) -> Self {
        self.documents
            .insert(characteristics.document_id.clone(), characteristics);
        self
    }
}

#[async_trait]
impl DocumentService for StaticDocuments {
    async fn characteristics(
        &self,
        id: &DocumentId,
    ) -> Result<DocumentCharacteristics, DocumentError> {
        self.documents
            .get(id)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<DocumentId>, DocumentError> {
        let mut ids: Vec<_> = self.documents.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// ==================== Fixtures ====================

pub fn characteristics(id: &str) -> DocumentCharacteristics {
    DocumentCharacteristics {
        document_id: DocumentId::new(id),
        domain: "literature".into(),
        word_count: 2400,
        temporal_span: TemporalSpan::new(1600, 1650),
        complexity: UnitScore::saturating(0.5),
    }
}

/// Tools `A`, `B` (sequential) and `C` (independent).
pub fn registry() -> ToolRegistry {
    ToolRegistry::new()
        .register(ToolDescriptor::new("A").with_domains(&["literature"]))
        .register(ToolDescriptor::new("B").with_domains(&["literature"]))
        .register(ToolDescriptor::new("C").independent())
}

pub fn proposal_json(tools: &[&str], strategy: &str, confidence: f64) -> String {
    serde_json::json!({
        "tools": tools,
        "embedding_model": "macberth",
        "strategy": strategy,
        "reasoning": "fits the period",
        "confidence": confidence,
    })
    .to_string()
}

// ==================== Engine ====================

pub struct TestEngine {
    pub repos: Arc<MemoryRepos>,
    pub ledger: Arc<MemoryLedger>,
    pub engine: crate::engine::Engine,
}

/// Engine over in-memory fakes with documents `doc-1`, `doc-2` and [`registry`].
pub async fn test_engine(
    gateway: ScriptedGateway,
    invoker: ScriptedInvoker,
    config: crate::config::EngineConfig,
) -> TestEngine {
    let repos = Arc::new(MemoryRepos::default());
    let ledger = Arc::new(MemoryLedger::default());
    let deps = crate::engine::EngineDeps {
        gateway: Arc::new(gateway),
        documents: Arc::new(
            StaticDocuments::default()
                .with(characteristics("doc-1"))
                .with(characteristics("doc-2")),
        ),
        invoker: Arc::new(invoker),
        ledger: ledger.clone(),
        stores: repos.stores(),
        tools: registry(),
    };
    let engine = crate::engine::Engine::start(deps, config).await.unwrap();
    TestEngine {
        repos,
        ledger,
        engine,
    }
}
