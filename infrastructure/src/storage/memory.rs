//! In-memory implementation of every repository port.
//!
//! One [`MemoryStore`] backs all eight tables. Rows are cloned in and out, so
//! callers never observe each other's unsaved changes. The pattern table
//! enforces the versioned compare-and-swap contract.

use super::snapshot::StoreSnapshot;
use async_trait::async_trait;
use semantra_application::{
    AgentRepository, ConsensusRepository, DecisionFilter, DecisionRepository,
    ExperimentRepository, FeedbackRepository, OverrideRepository, PatternRepository,
    RepositoryError, Stores, ToolExecutionRepository,
};
use semantra_domain::{
    Agent, AgentId, ConsensusRun, ConsensusRunId, Decision, DecisionId, DecisionOverride,
    ExecutionId, ExperimentId, ExperimentRun, Feedback, FeedbackId, FeedbackStatus,
    LearningPattern, OverrideId, PatternId, ToolExecution,
};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One keyed table.
struct Table<K, V> {
    kind: &'static str,
    rows: RwLock<HashMap<K, V>>,
}

impl<K, V> Table<K, V>
where
    K: Hash + Eq + Clone + ToString,
    V: Clone,
{
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            rows: RwLock::new(HashMap::new()),
        }
    }

    fn from_rows(kind: &'static str, rows: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            kind,
            rows: RwLock::new(rows.into_iter().collect()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<K, V>>, RepositoryError> {
        self.rows
            .read()
            .map_err(|_| RepositoryError::Storage(format!("{} table lock poisoned", self.kind)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<K, V>>, RepositoryError> {
        self.rows
            .write()
            .map_err(|_| RepositoryError::Storage(format!("{} table lock poisoned", self.kind)))
    }

    fn insert(&self, key: &K, value: &V) -> Result<(), RepositoryError> {
        let mut rows = self.write()?;
        if rows.contains_key(key) {
            return Err(RepositoryError::duplicate(self.kind, key.to_string()));
        }
        rows.insert(key.clone(), value.clone());
        Ok(())
    }

    fn replace(&self, key: &K, value: &V) -> Result<(), RepositoryError> {
        let mut rows = self.write()?;
        let Some(slot) = rows.get_mut(key) else {
            return Err(RepositoryError::not_found(self.kind, key.to_string()));
        };
        *slot = value.clone();
        Ok(())
    }

    fn get(&self, key: &K) -> Result<Option<V>, RepositoryError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn select(&self, keep: impl Fn(&V) -> bool) -> Result<Vec<V>, RepositoryError> {
        Ok(self.read()?.values().filter(|v| keep(v)).cloned().collect())
    }

    fn values(&self) -> Vec<V> {
        self.select(|_| true).unwrap_or_default()
    }
}

pub struct MemoryStore {
    decisions: Table<DecisionId, Decision>,
    executions: Table<ExecutionId, ToolExecution>,
    feedback: Table<FeedbackId, Feedback>,
    overrides: Table<OverrideId, DecisionOverride>,
    patterns: Table<PatternId, LearningPattern>,
    consensus: Table<ConsensusRunId, ConsensusRun>,
    agents: Table<AgentId, Agent>,
    experiments: Table<ExperimentId, ExperimentRun>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            decisions: Table::new("decision"),
            executions: Table::new("tool execution"),
            feedback: Table::new("feedback"),
            overrides: Table::new("override"),
            patterns: Table::new("learning pattern"),
            consensus: Table::new("consensus run"),
            agents: Table::new("agent"),
            experiments: Table::new("experiment"),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            decisions: Table::from_rows(
                "decision",
                snapshot.decisions.into_iter().map(|r| (r.id.clone(), r)),
            ),
            executions: Table::from_rows(
                "tool execution",
                snapshot.executions.into_iter().map(|r| (r.id.clone(), r)),
            ),
            feedback: Table::from_rows(
                "feedback",
                snapshot.feedback.into_iter().map(|r| (r.id.clone(), r)),
            ),
            overrides: Table::from_rows(
                "override",
                snapshot.overrides.into_iter().map(|r| (r.id.clone(), r)),
            ),
            patterns: Table::from_rows(
                "learning pattern",
                snapshot.patterns.into_iter().map(|r| (r.id.clone(), r)),
            ),
            consensus: Table::from_rows(
                "consensus run",
                snapshot.consensus.into_iter().map(|r| (r.id.clone(), r)),
            ),
            agents: Table::from_rows(
                "agent",
                snapshot.agents.into_iter().map(|r| (r.id.clone(), r)),
            ),
            experiments: Table::from_rows(
                "experiment",
                snapshot.experiments.into_iter().map(|r| (r.id.clone(), r)),
            ),
        }
    }

    /// Copy every table into a serializable snapshot.
    ///
    /// Rows are ordered by creation time so snapshots diff cleanly.
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut snapshot = StoreSnapshot {
            decisions: self.decisions.values(),
            executions: self.executions.values(),
            feedback: self.feedback.values(),
            overrides: self.overrides.values(),
            patterns: self.patterns.values(),
            consensus: self.consensus.values(),
            agents: self.agents.values(),
            experiments: self.experiments.values(),
            ..StoreSnapshot::default()
        };
        snapshot.decisions.sort_by_key(|d| d.started_at);
        snapshot
            .executions
            .sort_by(|a, b| (&a.decision_id, a.execution_order).cmp(&(&b.decision_id, b.execution_order)));
        snapshot.feedback.sort_by_key(|f| f.submitted_at);
        snapshot.overrides.sort_by_key(|o| o.created_at);
        snapshot.patterns.sort_by_key(|p| p.created_at);
        snapshot.consensus.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.agents.sort_by_key(|a| a.registered_at);
        snapshot.experiments.sort_by_key(|e| e.started_at);
        snapshot
    }

    /// The same store behind every repository port.
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
}

#[async_trait]
impl DecisionRepository for MemoryStore {
    async fn insert(&self, decision: &Decision) -> Result<(), RepositoryError> {
        self.decisions.insert(&decision.id, decision)
    }

    async fn update(&self, decision: &Decision) -> Result<(), RepositoryError> {
        self.decisions.replace(&decision.id, decision)
    }

    async fn get(&self, id: &DecisionId) -> Result<Option<Decision>, RepositoryError> {
        self.decisions.get(id)
    }

    async fn list(&self, filter: &DecisionFilter) -> Result<Vec<Decision>, RepositoryError> {
        let mut decisions = self.decisions.select(|d| filter.matches(d))?;
        decisions.sort_by_key(|d| d.started_at);
        Ok(decisions)
    }
}

#[async_trait]
impl ToolExecutionRepository for MemoryStore {
    async fn insert(&self, execution: &ToolExecution) -> Result<(), RepositoryError> {
        let mut rows = self.executions.write()?;
        let taken = rows.values().any(|e| {
            e.decision_id == execution.decision_id && e.execution_order == execution.execution_order
        });
        if taken || rows.contains_key(&execution.id) {
            return Err(RepositoryError::duplicate(
                "tool execution",
                format!("{}#{}", execution.decision_id, execution.execution_order),
            ));
        }
        rows.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn update(&self, execution: &ToolExecution) -> Result<(), RepositoryError> {
        self.executions.replace(&execution.id, execution)
    }

    async fn get(&self, id: &ExecutionId) -> Result<Option<ToolExecution>, RepositoryError> {
        self.executions.get(id)
    }

    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<ToolExecution>, RepositoryError> {
        let mut executions = self.executions.select(|e| &e.decision_id == decision)?;
        executions.sort_by_key(|e| e.execution_order);
        Ok(executions)
    }
}

#[async_trait]
impl FeedbackRepository for MemoryStore {
    async fn insert(&self, feedback: &Feedback) -> Result<(), RepositoryError> {
        self.feedback.insert(&feedback.id, feedback)
    }

    async fn update(&self, feedback: &Feedback) -> Result<(), RepositoryError> {
        self.feedback.replace(&feedback.id, feedback)
    }

    async fn get(&self, id: &FeedbackId) -> Result<Option<Feedback>, RepositoryError> {
        self.feedback.get(id)
    }

    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<Feedback>, RepositoryError> {
        let mut feedback = self.feedback.select(|f| &f.decision_id == decision)?;
        feedback.sort_by_key(|f| f.submitted_at);
        Ok(feedback)
    }

    async fn list(&self, status: Option<FeedbackStatus>) -> Result<Vec<Feedback>, RepositoryError> {
        let mut feedback = self.feedback.select(|f| status.is_none_or(|s| f.status == s))?;
        feedback.sort_by_key(|f| f.submitted_at);
        Ok(feedback)
    }
}

#[async_trait]
impl OverrideRepository for MemoryStore {
    async fn insert(&self, record: &DecisionOverride) -> Result<(), RepositoryError> {
        self.overrides.insert(&record.id, record)
    }

    async fn update(&self, record: &DecisionOverride) -> Result<(), RepositoryError> {
        self.overrides.replace(&record.id, record)
    }

    async fn get(&self, id: &OverrideId) -> Result<Option<DecisionOverride>, RepositoryError> {
        self.overrides.get(id)
    }

    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<DecisionOverride>, RepositoryError> {
        let mut overrides = self.overrides.select(|o| &o.decision_id == decision)?;
        overrides.sort_by_key(|o| o.created_at);
        Ok(overrides)
    }
}

#[async_trait]
impl PatternRepository for MemoryStore {
    async fn insert(&self, pattern: &LearningPattern) -> Result<LearningPattern, RepositoryError> {
        let mut stored = pattern.clone();
        stored.version = 1;
        self.patterns.insert(&stored.id, &stored)?;
        Ok(stored)
    }

    async fn insert_if_absent(
        &self,
        pattern: &LearningPattern,
    ) -> Result<LearningPattern, RepositoryError> {
        let mut rows = self.patterns.write()?;
        if let Some(winner) = rows
            .values()
            .find(|p| p.status.is_live() && p.signature.covers(&pattern.signature))
        {
            return Err(RepositoryError::VersionConflict {
                id: winner.id.to_string(),
                expected: 0,
                actual: winner.version,
            });
        }
        if rows.contains_key(&pattern.id) {
            return Err(RepositoryError::duplicate("learning pattern", &pattern.id));
        }
        let mut stored = pattern.clone();
        stored.version = 1;
        rows.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &PatternId) -> Result<Option<LearningPattern>, RepositoryError> {
        self.patterns.get(id)
    }

    async fn list(&self) -> Result<Vec<LearningPattern>, RepositoryError> {
        let mut patterns = self.patterns.select(|_| true)?;
        patterns.sort_by_key(|p| p.created_at);
        Ok(patterns)
    }

    async fn compare_and_swap(
        &self,
        pattern: &LearningPattern,
        expected_version: u64,
    ) -> Result<LearningPattern, RepositoryError> {
        let mut rows = self.patterns.write()?;
        let Some(current) = rows.get_mut(&pattern.id) else {
            return Err(RepositoryError::not_found("learning pattern", &pattern.id));
        };
        if current.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                id: pattern.id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }
        let mut stored = pattern.clone();
        stored.version = expected_version + 1;
        *current = stored.clone();
        Ok(stored)
    }
}

#[async_trait]
impl ConsensusRepository for MemoryStore {
    async fn insert(&self, run: &ConsensusRun) -> Result<(), RepositoryError> {
        self.consensus.insert(&run.id, run)
    }

    async fn get(&self, id: &ConsensusRunId) -> Result<Option<ConsensusRun>, RepositoryError> {
        self.consensus.get(id)
    }

    async fn list_for_decision(
        &self,
        decision: &DecisionId,
    ) -> Result<Vec<ConsensusRun>, RepositoryError> {
        self.consensus.select(|r| &r.decision_id == decision)
    }
}

#[async_trait]
impl AgentRepository for MemoryStore {
    async fn insert(&self, agent: &Agent) -> Result<(), RepositoryError> {
        self.agents.insert(&agent.id, agent)
    }

    async fn get(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        self.agents.get(id)
    }

    async fn list(&self) -> Result<Vec<Agent>, RepositoryError> {
        let mut agents = self.agents.select(|_| true)?;
        agents.sort_by_key(|a| a.registered_at);
        Ok(agents)
    }

    async fn adjust_references(&self, id: &AgentId, delta: i64) -> Result<Agent, RepositoryError> {
        let mut rows = self.agents.write()?;
        let Some(agent) = rows.get_mut(id) else {
            return Err(RepositoryError::not_found("agent", id));
        };
        agent.reference_count = agent.reference_count.saturating_add_signed(delta);
        Ok(agent.clone())
    }
}

#[async_trait]
impl ExperimentRepository for MemoryStore {
    async fn insert(&self, run: &ExperimentRun) -> Result<(), RepositoryError> {
        self.experiments.insert(&run.id, run)
    }

    async fn update(&self, run: &ExperimentRun) -> Result<(), RepositoryError> {
        self.experiments.replace(&run.id, run)
    }

    async fn get(&self, id: &ExperimentId) -> Result<Option<ExperimentRun>, RepositoryError> {
        self.experiments.get(id)
    }

    async fn list(&self) -> Result<Vec<ExperimentRun>, RepositoryError> {
        let mut runs = self.experiments.select(|_| true)?;
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }
}
