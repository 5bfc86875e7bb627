//! Provenance ledger port
//!
//! Append-only store of activities and the entities they generated. Only the
//! write/read contract matters to the engine; the storage engine is an
//! adapter concern.

use async_trait::async_trait;
use semantra_domain::{Activity, ActivityId, ActivityKind, AgentId, EntityId, EntityKind, ProvEntity};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Unknown activity: {0}")]
    UnknownActivity(String),

    #[error("Ledger write failed: {0}")]
    WriteFailed(String),
}

#[async_trait]
pub trait ProvenanceLedger: Send + Sync {
    async fn record_activity(
        &self,
        kind: ActivityKind,
        actor: &AgentId,
        params: Value,
    ) -> Result<ActivityId, LedgerError>;

    /// Record an entity generated by an already recorded activity.
    async fn record_entity(
        &self,
        kind: EntityKind,
        value: Value,
        generated_by: &ActivityId,
        derived_from: &[EntityId],
    ) -> Result<EntityId, LedgerError>;

    async fn activity(&self, id: &ActivityId) -> Result<Option<Activity>, LedgerError>;

    async fn entity(&self, id: &EntityId) -> Result<Option<ProvEntity>, LedgerError>;

    /// The entity and everything it was transitively derived from, nearest first.
    async fn lineage(&self, id: &EntityId) -> Result<Vec<ProvEntity>, LedgerError> {
        let mut out = Vec::new();
        let mut queue = std::collections::VecDeque::from([id.clone()]);
        let mut seen = std::collections::HashSet::new();
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(entity) = self.entity(&next).await? {
                queue.extend(entity.derived_from.iter().cloned());
                out.push(entity);
            }
        }
        Ok(out)
    }
}
