//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and use domain types where appropriate.

mod consensus;
mod engine;
mod llm;
mod logging;
mod models;
mod output;
mod storage;
mod tools;

pub use consensus::FileConsensusConfig;
pub use engine::FileEngineConfig;
pub use llm::{FileLlmConfig, LlmProvider};
pub use logging::FileLoggingConfig;
pub use models::FileModelsConfig;
pub use output::FileOutputConfig;
pub use storage::FileStorageConfig;
pub use tools::{DEFAULT_TOOL_QUALITY, FileToolConfig, tool_registry};

use semantra_application::{EngineConfig, ModelSelection};
use semantra_domain::{ConfigIssue, ConfigIssueCode, LearningPolicy, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Retries, deadlines and the worker pool
    pub engine: FileEngineConfig,
    /// Pattern status thresholds and success-rate policy
    pub learning: LearningPolicy,
    pub consensus: FileConsensusConfig,
    pub models: FileModelsConfig,
    pub llm: FileLlmConfig,
    /// NLP tools keyed by name
    pub tools: BTreeMap<String, FileToolConfig>,
    pub storage: FileStorageConfig,
    pub logging: FileLoggingConfig,
    pub output: FileOutputConfig,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    ///
    /// Checks value ranges, consensus weights, the worker pool, learning
    /// floors and the tool sections.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        issues.extend(self.engine.validate());
        issues.extend(validate_learning(&self.learning));
        issues.extend(self.consensus.validate());
        issues.extend(tools::validate_tools(&self.tools));
        issues
    }

    /// The engine's view of this configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_execution(self.engine.to_execution_params())
            .with_models(ModelSelection {
                proposal: self.models.parse_proposal(),
                consensus: self.consensus.parse_models(),
                default_embedding: self.models.parse_default_embedding(),
            })
            .with_learning(self.learning.clone())
            .with_consensus(self.consensus.to_policy())
    }

    pub fn tool_registry(&self) -> ToolRegistry {
        tool_registry(&self.tools)
    }
}

fn validate_learning(policy: &LearningPolicy) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    for (field, value) in [
        ("activation_floor", policy.activation_floor),
        ("review_floor", policy.review_floor),
        ("sharp_drop", policy.sharp_drop),
        ("decay", policy.decay),
        ("override_seed_confidence", policy.override_seed_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ValueOutOfRange,
                format!("learning.{}: {} is outside [0, 1]", field, value),
            ));
        }
    }
    if policy.activation_floor < policy.review_floor {
        issues.push(ConfigIssue::warning(
            ConfigIssueCode::ActivationBelowReviewFloor,
            format!(
                "learning.activation_floor ({}) is below learning.review_floor ({}); patterns may flap between active and under review",
                policy.activation_floor, policy.review_floor
            ),
        ));
    }
    issues
}
