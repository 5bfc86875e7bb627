//! Consensus configuration from TOML (`[consensus]` section)

use semantra_domain::{ConfigIssue, ConfigIssueCode, ConsensusPolicy, Model};
use serde::{Deserialize, Serialize};

/// Agreement weights and the models consulted
///
/// # Example
///
/// ```toml
/// [consensus]
/// threshold = 0.7
/// tool_weight = 0.7
/// strategy_weight = 0.3
/// models = ["mistral", "qwen2.5", "gemma3"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConsensusConfig {
    pub threshold: f64,
    pub tool_weight: f64,
    pub strategy_weight: f64,
    /// Consensus runs when two or more models are listed
    pub models: Vec<String>,
}

impl Default for FileConsensusConfig {
    fn default() -> Self {
        let policy = ConsensusPolicy::default();
        Self {
            threshold: policy.threshold,
            tool_weight: policy.tool_weight,
            strategy_weight: policy.strategy_weight,
            models: Vec::new(),
        }
    }
}

impl FileConsensusConfig {
    pub fn to_policy(&self) -> ConsensusPolicy {
        ConsensusPolicy {
            tool_weight: self.tool_weight,
            strategy_weight: self.strategy_weight,
            threshold: self.threshold,
        }
    }

    pub fn parse_models(&self) -> Vec<Model> {
        self.models
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                // Model::from_str is infallible; unknown names become Custom(...)
                let Ok(model) = s.trim().parse::<Model>();
                model
            })
            .collect()
    }

    pub(super) fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        for (field, value) in [
            ("threshold", self.threshold),
            ("tool_weight", self.tool_weight),
            ("strategy_weight", self.strategy_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::ValueOutOfRange,
                    format!("consensus.{}: {} is outside [0, 1]", field, value),
                ));
            }
        }
        if self.tool_weight + self.strategy_weight <= 0.0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroConsensusWeights,
                "consensus.tool_weight and consensus.strategy_weight cannot both be 0",
            ));
        }
        if self.parse_models().len() == 1 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::SingleConsensusModel,
                "consensus.models lists a single model; consensus needs two or more and is disabled",
            ));
        }
        issues
    }
}
