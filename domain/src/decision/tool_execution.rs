//! Tool execution state machine.
//!
//! Tracks the lifecycle of one tool invoked on behalf of a decision. Each
//! [`ToolExecution`] wraps a [`ToolExecutionState`] whose variants carry only
//! the fields that are meaningful in that state.
//!
//! # State Transitions
//!
//! ```text
//! Running ──> Completed
//!        ├──> Error
//!        └──> Timeout
//! Skipped   (created directly, never ran)
//! ```
//!
//! Terminal executions are immutable; every transition out of a terminal
//! state is rejected.

use crate::core::error::DomainError;
use crate::core::ids::{DecisionId, ExecutionId};
use crate::core::score::UnitScore;
use crate::core::string::truncate;
use crate::provenance::ProvenanceLink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SUMMARY_PREVIEW_LEN: usize = 500;

/// Flat status label, used for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Error,
    Timeout,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }

    /// Error and timeout stop a sequential run.
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionStatus::Error | ExecutionStatus::Timeout)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolExecutionState {
    Running {
        started_at: DateTime<Utc>,
    },
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        output_summary: String,
        quality: UnitScore,
    },
    Error {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        error_message: String,
    },
    Timeout {
        started_at: DateTime<Utc>,
        timed_out_at: DateTime<Utc>,
    },
    Skipped {
        reason: String,
    },
}

impl ToolExecutionState {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Running { .. } => ExecutionStatus::Running,
            Self::Completed { .. } => ExecutionStatus::Completed,
            Self::Error { .. } => ExecutionStatus::Error,
            Self::Timeout { .. } => ExecutionStatus::Timeout,
            Self::Skipped { .. } => ExecutionStatus::Skipped,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Duration in milliseconds (terminal states that actually ran).
    pub fn duration_ms(&self) -> Option<u64> {
        let (start, end) = match self {
            Self::Completed {
                started_at,
                completed_at,
                ..
            } => (started_at, completed_at),
            Self::Error {
                started_at,
                failed_at,
                ..
            } => (started_at, failed_at),
            Self::Timeout {
                started_at,
                timed_out_at,
            } => (started_at, timed_out_at),
            _ => return None,
        };
        Some((*end - *start).num_milliseconds().max(0) as u64)
    }

    pub fn quality(&self) -> Option<UnitScore> {
        match self {
            Self::Completed { quality, .. } => Some(*quality),
            _ => None,
        }
    }
}

/// One tool invocation owned by a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: ExecutionId,
    pub decision_id: DecisionId,
    pub tool_name: String,
    /// Position within the decision; unique per decision.
    pub execution_order: u32,
    pub state: ToolExecutionState,
    pub provenance: ProvenanceLink,
}

impl ToolExecution {
    /// Start a new execution in `Running`.
    pub fn start(
        decision_id: DecisionId,
        tool_name: impl Into<String>,
        execution_order: u32,
        provenance: ProvenanceLink,
    ) -> Self {
        Self {
            id: ExecutionId::generate(),
            decision_id,
            tool_name: tool_name.into(),
            execution_order,
            state: ToolExecutionState::Running {
                started_at: Utc::now(),
            },
            provenance,
        }
    }

    /// Record a tool that was never run.
    pub fn skipped(
        decision_id: DecisionId,
        tool_name: impl Into<String>,
        execution_order: u32,
        reason: impl Into<String>,
        provenance: ProvenanceLink,
    ) -> Self {
        Self {
            id: ExecutionId::generate(),
            decision_id,
            tool_name: tool_name.into(),
            execution_order,
            state: ToolExecutionState::Skipped {
                reason: reason.into(),
            },
            provenance,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn running_since(&self, to: ExecutionStatus) -> Result<DateTime<Utc>, DomainError> {
        match &self.state {
            ToolExecutionState::Running { started_at } => Ok(*started_at),
            other => Err(DomainError::AlreadyTerminal {
                entity: "tool execution",
                status: format!("{} (attempted {})", other.status(), to),
            }),
        }
    }

    /// Running -> Completed.
    pub fn complete(
        &mut self,
        output_summary: &str,
        quality: UnitScore,
    ) -> Result<(), DomainError> {
        let started_at = self.running_since(ExecutionStatus::Completed)?;
        self.state = ToolExecutionState::Completed {
            started_at,
            completed_at: Utc::now(),
            output_summary: truncate(output_summary, SUMMARY_PREVIEW_LEN),
            quality,
        };
        Ok(())
    }

    /// Running -> Error.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        let started_at = self.running_since(ExecutionStatus::Error)?;
        self.state = ToolExecutionState::Error {
            started_at,
            failed_at: Utc::now(),
            error_message: message.into(),
        };
        Ok(())
    }

    /// Running -> Timeout.
    pub fn time_out(&mut self) -> Result<(), DomainError> {
        let started_at = self.running_since(ExecutionStatus::Timeout)?;
        self.state = ToolExecutionState::Timeout {
            started_at,
            timed_out_at: Utc::now(),
        };
        Ok(())
    }
}

/// Mean quality over completed executions, if any completed.
pub fn mean_quality(executions: &[ToolExecution]) -> Option<f64> {
    let qualities: Vec<f64> = executions
        .iter()
        .filter_map(|e| e.state.quality())
        .map(UnitScore::value)
        .collect();
    if qualities.is_empty() {
        None
    } else {
        Some(qualities.iter().sum::<f64>() / qualities.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{ActivityId, EntityId};

    fn link() -> ProvenanceLink {
        ProvenanceLink::new(ActivityId::new("act-1"), EntityId::new("ent-1"))
    }

    fn running() -> ToolExecution {
        ToolExecution::start(DecisionId::new("dec-1"), "tokenizer", 0, link())
    }

    #[test]
    fn test_running_to_completed() {
        let mut exec = running();
        assert_eq!(exec.status(), ExecutionStatus::Running);
        exec.complete("42 tokens", UnitScore::saturating(0.9)).unwrap();
        assert_eq!(exec.status(), ExecutionStatus::Completed);
        assert!(exec.is_terminal());
        assert!(exec.state.duration_ms().is_some());
        assert_eq!(exec.state.quality().unwrap().value(), 0.9);
    }

    #[test]
    fn test_running_to_error_and_timeout() {
        let mut exec = running();
        exec.fail("boom").unwrap();
        assert!(exec.status().is_failure());

        let mut exec = running();
        exec.time_out().unwrap();
        assert_eq!(exec.status(), ExecutionStatus::Timeout);
    }

    #[test]
    fn test_terminal_is_immutable() {
        let mut exec = running();
        exec.fail("boom").unwrap();
        let err = exec.complete("late", UnitScore::ONE).unwrap_err();
        assert!(err.is_transition_error());
        assert!(exec.time_out().is_err());
        assert_eq!(exec.status(), ExecutionStatus::Error);
    }

    #[test]
    fn test_skipped_never_ran() {
        let mut exec =
            ToolExecution::skipped(DecisionId::new("dec-1"), "oed", 2, "previous tool failed", link());
        assert!(exec.is_terminal());
        assert!(exec.state.duration_ms().is_none());
        assert!(exec.complete("x", UnitScore::ONE).is_err());
    }

    #[test]
    fn test_summary_is_truncated() {
        let mut exec = running();
        let long = "x".repeat(2000);
        exec.complete(&long, UnitScore::ONE).unwrap();
        match &exec.state {
            ToolExecutionState::Completed { output_summary, .. } => {
                assert!(output_summary.len() <= SUMMARY_PREVIEW_LEN);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_mean_quality() {
        let mut a = running();
        a.complete("a", UnitScore::saturating(0.8)).unwrap();
        let mut b = running();
        b.complete("b", UnitScore::saturating(0.4)).unwrap();
        let mut c = running();
        c.fail("c").unwrap();
        let mean = mean_quality(&[a, b, c]).unwrap();
        assert!((mean - 0.6).abs() < 1e-9);
        assert!(mean_quality(&[]).is_none());
    }

    #[test]
    fn test_state_serde_tag() {
        let exec = running();
        let json = serde_json::to_value(&exec.state).unwrap();
        assert_eq!(json["status"], "running");
    }
}
