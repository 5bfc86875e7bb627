//! Engine configuration container.
//!
//! [`EngineConfig`] groups the split configuration types the use cases need.
//! Use cases receive only the slices they read; the engine facade holds the
//! whole container.

use crate::config::ExecutionParams;
use semantra_domain::{ConsensusPolicy, EmbeddingModel, LearningPolicy, Model};

/// Which models the engine talks to.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection {
    /// Model asked for a proposal when consensus is not in use.
    pub proposal: Model,
    /// Models queried concurrently for consensus; consensus runs with two or more.
    pub consensus: Vec<Model>,
    /// Embedding model used when neither the LLM nor a pattern names one.
    pub default_embedding: EmbeddingModel,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            proposal: Model::default(),
            consensus: Vec::new(),
            default_embedding: EmbeddingModel::default(),
        }
    }
}

impl ModelSelection {
    pub fn uses_consensus(&self) -> bool {
        self.consensus.len() >= 2
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub execution: ExecutionParams,
    pub models: ModelSelection,
    pub learning: LearningPolicy,
    pub consensus: ConsensusPolicy,
}

impl EngineConfig {
    pub fn with_execution(mut self, execution: ExecutionParams) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_models(mut self, models: ModelSelection) -> Self {
        self.models = models;
        self
    }

    pub fn with_learning(mut self, learning: LearningPolicy) -> Self {
        self.learning = learning;
        self
    }

    pub fn with_consensus(mut self, consensus: ConsensusPolicy) -> Self {
        self.consensus = consensus;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consensus_needs_two_models() {
        let mut models = ModelSelection::default();
        assert!(!models.uses_consensus());
        models.consensus = vec![Model::Qwen25];
        assert!(!models.uses_consensus());
        models.consensus.push(Model::Mistral);
        assert!(models.uses_consensus());
    }
}
