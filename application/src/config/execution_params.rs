//! Execution parameters — retry, deadline and concurrency control.
//!
//! [`ExecutionParams`] groups the static parameters that bound how long and
//! how often the engine talks to external systems. These are application-layer
//! concerns, not domain policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry, deadline and worker-pool parameters.
///
/// | Parameter | Used by |
/// |-----------|---------|
/// | `max_llm_retries`, `decision_deadline` | Orchestrator proposal |
/// | `max_tool_retries`, `tool_timeout` | Tool execution tracker |
/// | `worker_pool_size` | Experiment runner |
/// | `max_conflict_retries` | Pattern learner |
/// | `pattern_merge_floor` | Orchestrator pattern merge |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Extra LLM attempts after the first one fails.
    pub max_llm_retries: u32,
    /// Extra attempts per tool invocation after the first one fails.
    pub max_tool_retries: u32,
    /// Budget of one decision from proposal to finalization.
    pub decision_deadline: Duration,
    /// Budget of a single tool invocation.
    pub tool_timeout: Duration,
    /// Decisions processed concurrently by an experiment.
    pub worker_pool_size: usize,
    /// Optimistic-concurrency retries for pattern updates.
    pub max_conflict_retries: u32,
    /// Minimum `confidence × success_rate` for a pattern to be merged.
    pub pattern_merge_floor: f64,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            max_llm_retries: 2,
            max_tool_retries: 1,
            decision_deadline: Duration::from_secs(300),
            tool_timeout: Duration::from_secs(60),
            worker_pool_size: 4,
            max_conflict_retries: 5,
            pattern_merge_floor: 0.5,
        }
    }
}

impl ExecutionParams {
    // ==================== Builder Methods ====================

    pub fn with_max_llm_retries(mut self, max: u32) -> Self {
        self.max_llm_retries = max;
        self
    }

    pub fn with_max_tool_retries(mut self, max: u32) -> Self {
        self.max_tool_retries = max;
        self
    }

    pub fn with_decision_deadline(mut self, deadline: Duration) -> Self {
        self.decision_deadline = deadline;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    pub fn with_max_conflict_retries(mut self, max: u32) -> Self {
        self.max_conflict_retries = max;
        self
    }

    pub fn with_pattern_merge_floor(mut self, floor: f64) -> Self {
        self.pattern_merge_floor = floor;
        self
    }

    /// The decision deadline as a chrono duration (saturating).
    pub fn decision_deadline_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.decision_deadline).unwrap_or(chrono::Duration::MAX)
    }
}
