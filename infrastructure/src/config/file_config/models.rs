//! Model selection from TOML (`[models]` section)

use semantra_domain::{EmbeddingModel, Model};
use serde::{Deserialize, Serialize};

/// # Example
///
/// ```toml
/// [models]
/// proposal = "llama3.3"            # Asked for a proposal when consensus is off
/// default_embedding = "macberth"   # Used when neither LLM nor pattern names one
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileModelsConfig {
    pub proposal: Option<String>,
    pub default_embedding: Option<String>,
}

impl FileModelsConfig {
    pub fn parse_proposal(&self) -> Model {
        match self.proposal.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                let Ok(model) = name.parse::<Model>();
                model
            }
            _ => Model::default(),
        }
    }

    pub fn parse_default_embedding(&self) -> EmbeddingModel {
        match self.default_embedding.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                let Ok(model) = name.parse::<EmbeddingModel>();
                model
            }
            _ => EmbeddingModel::default(),
        }
    }
}
