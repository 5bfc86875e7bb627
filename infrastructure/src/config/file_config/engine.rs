//! Execution limits from TOML (`[engine]` section)

use semantra_application::ExecutionParams;
use semantra_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest deadline or timeout accepted (one week).
const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Retry, deadline and concurrency settings
///
/// # Example
///
/// ```toml
/// [engine]
/// max_llm_retries = 2
/// max_tool_retries = 1
/// decision_deadline_secs = 300
/// tool_timeout_secs = 60
/// worker_pool_size = 4
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEngineConfig {
    pub max_llm_retries: u32,
    pub max_tool_retries: u32,
    pub decision_deadline_secs: u64,
    pub tool_timeout_secs: u64,
    pub worker_pool_size: usize,
    pub max_conflict_retries: u32,
    /// Minimum pattern score for a pattern to be merged into a proposal
    pub pattern_merge_floor: f64,
}

impl Default for FileEngineConfig {
    fn default() -> Self {
        let params = ExecutionParams::default();
        Self {
            max_llm_retries: params.max_llm_retries,
            max_tool_retries: params.max_tool_retries,
            decision_deadline_secs: params.decision_deadline.as_secs(),
            tool_timeout_secs: params.tool_timeout.as_secs(),
            worker_pool_size: params.worker_pool_size,
            max_conflict_retries: params.max_conflict_retries,
            pattern_merge_floor: params.pattern_merge_floor,
        }
    }
}

impl FileEngineConfig {
    pub fn to_execution_params(&self) -> ExecutionParams {
        ExecutionParams::default()
            .with_max_llm_retries(self.max_llm_retries)
            .with_max_tool_retries(self.max_tool_retries)
            .with_decision_deadline(Duration::from_secs(self.decision_deadline_secs))
            .with_tool_timeout(Duration::from_secs(self.tool_timeout_secs))
            .with_worker_pool_size(self.worker_pool_size)
            .with_max_conflict_retries(self.max_conflict_retries)
            .with_pattern_merge_floor(self.pattern_merge_floor)
    }

    pub(super) fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.worker_pool_size == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroWorkerPool,
                "engine.worker_pool_size must be at least 1",
            ));
        }
        for (key, secs) in [
            ("decision_deadline_secs", self.decision_deadline_secs),
            ("tool_timeout_secs", self.tool_timeout_secs),
        ] {
            if !(1..=MAX_DURATION_SECS).contains(&secs) {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::DurationOutOfRange,
                    format!(
                        "engine.{}: {} is outside 1..={} seconds",
                        key, secs, MAX_DURATION_SECS
                    ),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.pattern_merge_floor) {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ValueOutOfRange,
                format!(
                    "engine.pattern_merge_floor: {} is outside [0, 1]",
                    self.pattern_merge_floor
                ),
            ));
        }
        issues
    }
}
