//! Provenance recorder
//!
//! Every row the engine persists is registered here first: an activity for
//! what happened, then an entity snapshot of the row it produced.
//!
//! ```text
//! begin(kind, actor) ──> build row with pending link ──> generated(row) ──> persist
//! ```
//!
//! Entries are append-only. A row whose write fails after its entity was
//! recorded leaves an unreferenced entry in the ledger; the reverse (a row
//! without an entry) is a consistency violation.

use crate::error::EngineError;
use crate::ports::provenance_ledger::ProvenanceLedger;
use semantra_domain::{
    ActivityId, ActivityKind, AgentId, EntityId, EntityKind, ProvEntity, ProvenanceLink,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ProvenanceRecorder {
    ledger: Arc<dyn ProvenanceLedger>,
}

impl ProvenanceRecorder {
    pub fn new(ledger: Arc<dyn ProvenanceLedger>) -> Self {
        Self { ledger }
    }

    /// Record an activity performed by `actor`.
    pub async fn begin(
        &self,
        kind: ActivityKind,
        actor: &AgentId,
        params: Value,
    ) -> Result<ActivityId, EngineError> {
        let id = self.ledger.record_activity(kind, actor, params).await?;
        debug!("Recorded activity {} ({})", id, kind);
        Ok(id)
    }

    /// Record the row generated by `activity` and return its resolved link.
    pub async fn generated<T: Serialize + Sync>(
        &self,
        activity: &ActivityId,
        kind: EntityKind,
        row: &T,
        derived_from: &[EntityId],
    ) -> Result<ProvenanceLink, EngineError> {
        let value = serde_json::to_value(row)
            .map_err(|e| EngineError::Internal(format!("cannot snapshot {kind}: {e}")))?;
        let entity = self
            .ledger
            .record_entity(kind, value, activity, derived_from)
            .await?;
        debug!("Recorded entity {} ({}) from {}", entity, kind, activity);
        Ok(ProvenanceLink::new(activity.clone(), entity))
    }

    /// Record a new revision of an existing row, derived from its previous entity.
    pub async fn revise<T: Serialize + Sync>(
        &self,
        kind: ActivityKind,
        actor: &AgentId,
        params: Value,
        entity_kind: EntityKind,
        row: &T,
        previous: &ProvenanceLink,
    ) -> Result<ProvenanceLink, EngineError> {
        let activity = self.begin(kind, actor, params).await?;
        self.generated(&activity, entity_kind, row, std::slice::from_ref(&previous.entity))
            .await
    }

    /// Check that a link resolves to an entity generated by its activity.
    pub async fn ensure_durable(&self, link: &ProvenanceLink) -> Result<(), EngineError> {
        if !link.is_recorded() {
            return Err(EngineError::ConsistencyViolation(format!(
                "row from activity {} has no entity record",
                link.activity
            )));
        }
        let Some(entity) = self.ledger.entity(&link.entity).await? else {
            return Err(EngineError::ConsistencyViolation(format!(
                "entity {} is not in the ledger",
                link.entity
            )));
        };
        if entity.generated_by != link.activity {
            return Err(EngineError::ConsistencyViolation(format!(
                "entity {} was generated by {}, not {}",
                link.entity, entity.generated_by, link.activity
            )));
        }
        if self.ledger.activity(&link.activity).await?.is_none() {
            return Err(EngineError::ConsistencyViolation(format!(
                "activity {} is not in the ledger",
                link.activity
            )));
        }
        Ok(())
    }

    pub async fn lineage(&self, entity: &EntityId) -> Result<Vec<ProvEntity>, EngineError> {
        Ok(self.ledger.lineage(entity).await?)
    }
}
