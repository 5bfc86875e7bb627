//! Shared utilities for use cases.

use crate::error::EngineError;
use crate::ports::repository::{
    AgentRepository, ConsensusRepository, DecisionRepository, ExperimentRepository,
    FeedbackRepository, OverrideRepository, PatternRepository, ToolExecutionRepository,
};
use semantra_domain::{Decision, DecisionId};
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

/// Every repository the engine writes to.
#[derive(Clone)]
pub struct Stores {
    pub decisions: Arc<dyn DecisionRepository>,
    pub executions: Arc<dyn ToolExecutionRepository>,
    pub feedback: Arc<dyn FeedbackRepository>,
    pub overrides: Arc<dyn OverrideRepository>,
    pub patterns: Arc<dyn PatternRepository>,
    pub consensus: Arc<dyn ConsensusRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub experiments: Arc<dyn ExperimentRepository>,
}

/// Load a decision or fail with `NotFound`.
pub(crate) async fn load_decision(
    decisions: &dyn DecisionRepository,
    id: &DecisionId,
) -> Result<Decision, EngineError> {
    decisions
        .get(id)
        .await?
        .ok_or_else(|| EngineError::not_found("decision", id))
}

/// Ids with a state change in progress.
pub(crate) struct InFlightSet<K> {
    ids: Mutex<HashSet<K>>,
}

impl<K: Hash + Eq + Clone> InFlightSet<K> {
    pub(crate) fn new() -> Self {
        Self {
            ids: Mutex::new(HashSet::new()),
        }
    }

    /// Claim `id`, or `None` while another call holds it.
    pub(crate) fn claim(&self, id: &K) -> Option<InFlight<'_, K>> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        ids.insert(id.clone()).then(|| InFlight {
            set: self,
            id: id.clone(),
        })
    }
}

/// Claim on one id; released on drop.
pub(crate) struct InFlight<'a, K: Hash + Eq + Clone> {
    set: &'a InFlightSet<K>,
    id: K,
}

impl<K: Hash + Eq + Clone> Drop for InFlight<'_, K> {
    fn drop(&mut self) {
        self.set
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
