//! In-process provenance ledger.

use async_trait::async_trait;
use chrono::Utc;
use semantra_application::ports::provenance_ledger::{LedgerError, ProvenanceLedger};
use semantra_domain::{Activity, ActivityId, ActivityKind, AgentId, EntityId, EntityKind, ProvEntity};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryLedger {
    activities: RwLock<HashMap<ActivityId, Activity>>,
    entities: RwLock<HashMap<EntityId, ProvEntity>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> (usize, usize) {
        (
            self.activities.read().map(|a| a.len()).unwrap_or(0),
            self.entities.read().map(|e| e.len()).unwrap_or(0),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0)
    }

    /// Build an activity record without storing it.
    pub(crate) fn new_activity(kind: ActivityKind, actor: &AgentId, params: Value) -> Activity {
        Activity {
            id: ActivityId::generate(),
            kind,
            actor: actor.clone(),
            params,
            recorded_at: Utc::now(),
        }
    }

    /// Build an entity record, checking that its activity is known.
    pub(crate) fn new_entity(
        &self,
        kind: EntityKind,
        value: Value,
        generated_by: &ActivityId,
        derived_from: &[EntityId],
    ) -> Result<ProvEntity, LedgerError> {
        if !self.knows_activity(generated_by)? {
            return Err(LedgerError::UnknownActivity(generated_by.to_string()));
        }
        Ok(ProvEntity {
            id: EntityId::generate(),
            kind,
            value,
            generated_by: generated_by.clone(),
            derived_from: derived_from.to_vec(),
            recorded_at: Utc::now(),
        })
    }

    pub(crate) fn put_activity(&self, activity: Activity) -> Result<(), LedgerError> {
        self.activities
            .write()
            .map_err(|_| poisoned())?
            .insert(activity.id.clone(), activity);
        Ok(())
    }

    pub(crate) fn put_entity(&self, entity: ProvEntity) -> Result<(), LedgerError> {
        self.entities
            .write()
            .map_err(|_| poisoned())?
            .insert(entity.id.clone(), entity);
        Ok(())
    }

    fn knows_activity(&self, id: &ActivityId) -> Result<bool, LedgerError> {
        Ok(self
            .activities
            .read()
            .map_err(|_| poisoned())?
            .contains_key(id))
    }
}

fn poisoned() -> LedgerError {
    LedgerError::WriteFailed("ledger lock poisoned".to_string())
}

#[async_trait]
impl ProvenanceLedger for InMemoryLedger {
    async fn record_activity(
        &self,
        kind: ActivityKind,
        actor: &AgentId,
        params: Value,
    ) -> Result<ActivityId, LedgerError> {
        let activity = Self::new_activity(kind, actor, params);
        let id = activity.id.clone();
        self.put_activity(activity)?;
        Ok(id)
    }

    async fn record_entity(
        &self,
        kind: EntityKind,
        value: Value,
        generated_by: &ActivityId,
        derived_from: &[EntityId],
    ) -> Result<EntityId, LedgerError> {
        let entity = self.new_entity(kind, value, generated_by, derived_from)?;
        let id = entity.id.clone();
        self.put_entity(entity)?;
        Ok(id)
    }

    async fn activity(&self, id: &ActivityId) -> Result<Option<Activity>, LedgerError> {
        Ok(self
            .activities
            .read()
            .map_err(|_| poisoned())?
            .get(id)
            .cloned())
    }

    async fn entity(&self, id: &EntityId) -> Result<Option<ProvEntity>, LedgerError> {
        Ok(self
            .entities
            .read()
            .map_err(|_| poisoned())?
            .get(id)
            .cloned())
    }
}
