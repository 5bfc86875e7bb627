//! Agent registry use case
//!
//! Registers actors and keeps their reference counts. Counts are adjusted
//! explicitly by whichever component persists a row naming the agent.

use crate::error::EngineError;
use crate::ports::repository::{AgentRepository, RepositoryError};
use semantra_domain::{Agent, AgentId, AgentKind};
use std::sync::Arc;
use tracing::{debug, info};

pub struct AgentRegistry {
    agents: Arc<dyn AgentRepository>,
}

impl AgentRegistry {
    pub fn new(agents: Arc<dyn AgentRepository>) -> Self {
        Self { agents }
    }

    /// Register a new actor under a fresh id.
    pub async fn register(&self, kind: AgentKind) -> Result<Agent, EngineError> {
        let agent = Agent::new(kind);
        self.agents.insert(&agent).await?;
        info!("Registered agent {}", agent.display_name());
        Ok(agent)
    }

    /// Insert `agent` unless an agent with its id already exists.
    ///
    /// Returns the stored agent either way.
    pub async fn ensure(&self, agent: Agent) -> Result<Agent, EngineError> {
        if let Some(existing) = self.agents.get(&agent.id).await? {
            return Ok(existing);
        }
        match self.agents.insert(&agent).await {
            Ok(()) => {
                debug!("Registered agent {}", agent.display_name());
                Ok(agent)
            }
            // Lost a race with another registration of the same id
            Err(RepositoryError::Duplicate { .. }) => self.require(&agent.id).await,
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: &AgentId) -> Result<Option<Agent>, EngineError> {
        Ok(self.agents.get(id).await?)
    }

    /// Fails with `NotFound` for an unregistered id.
    pub async fn require(&self, id: &AgentId) -> Result<Agent, EngineError> {
        self.agents
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("agent", id))
    }

    pub async fn list(&self) -> Result<Vec<Agent>, EngineError> {
        let mut agents = self.agents.list().await?;
        agents.sort_by_key(|a| a.registered_at);
        Ok(agents)
    }

    pub async fn increment(&self, id: &AgentId) -> Result<u64, EngineError> {
        Ok(self.agents.adjust_references(id, 1).await?.reference_count)
    }

    /// Saturates at zero.
    pub async fn decrement(&self, id: &AgentId) -> Result<u64, EngineError> {
        Ok(self.agents.adjust_references(id, -1).await?.reference_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRepos;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(Arc::new(MemoryRepos::default()))
    }

    #[tokio::test]
    async fn test_register_and_count() {
        let registry = registry();
        let ada = registry.register(AgentKind::person("Ada")).await.unwrap();

        assert_eq!(registry.increment(&ada.id).await.unwrap(), 1);
        assert_eq!(registry.increment(&ada.id).await.unwrap(), 2);
        assert_eq!(registry.decrement(&ada.id).await.unwrap(), 1);
        assert_eq!(registry.require(&ada.id).await.unwrap().reference_count, 1);
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let registry = registry();
        let agent = Agent::new(AgentKind::software("semantra", "1")).with_id("agt-engine");
        registry.ensure(agent.clone()).await.unwrap();
        registry.increment(&agent.id).await.unwrap();

        let again = registry.ensure(agent).await.unwrap();
        assert_eq!(again.reference_count, 1);
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let registry = registry();
        let err = registry.require(&AgentId::new("agt-x")).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "agent", .. }));
        assert!(registry.increment(&AgentId::new("agt-x")).await.is_err());
    }
}
