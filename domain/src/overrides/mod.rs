//! Override domain: manual corrections to a terminal decision.
//!
//! An override snapshots the original selection, names which part of it is
//! replaced, and is applied at most once. Application re-runs the pipeline as
//! a new decision derived from the original; the outcome is recorded as
//! [`ExecutionResults`] and compared against the original run.

use crate::core::error::DomainError;
use crate::core::ids::{AgentId, DecisionId, OverrideId};
use crate::core::model::EmbeddingModel;
use crate::decision::{
    Decision, DecisionStatus, StrategyProposal, ToolExecution, mean_quality,
};
use crate::provenance::ProvenanceLink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const COMPARISON_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideType {
    Full,
    ToolSelection,
    EmbeddingModel,
    Strategy,
}

impl OverrideType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideType::Full => "full",
            OverrideType::ToolSelection => "tool_selection",
            OverrideType::EmbeddingModel => "embedding_model",
            OverrideType::Strategy => "strategy",
        }
    }
}

impl std::str::FromStr for OverrideType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "full" => Ok(OverrideType::Full),
            "tool_selection" | "tools" => Ok(OverrideType::ToolSelection),
            "embedding_model" | "model" => Ok(OverrideType::EmbeddingModel),
            "strategy" => Ok(OverrideType::Strategy),
            other => Err(DomainError::InvalidValue(format!(
                "unknown override type '{other}'"
            ))),
        }
    }
}

/// The replacement values a researcher supplies.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OverridePayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<EmbeddingModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl OverrideType {
    /// Merge the payload into the original selection.
    ///
    /// Only the fields this type covers are taken from the payload; a covered
    /// field that the payload leaves empty is an error, except that a full
    /// override falls back to the original model and strategy.
    pub fn resolve(
        &self,
        original: &StrategyProposal,
        payload: &OverridePayload,
    ) -> Result<StrategyProposal, DomainError> {
        let mut target = original.clone();
        target.confidence = None;
        match self {
            OverrideType::Full => {
                target.tools = require_tools(payload)?;
                if let Some(model) = &payload.embedding_model {
                    target.embedding_model = Some(model.clone());
                }
                if let Some(strategy) = &payload.strategy {
                    target.strategy = strategy.clone();
                }
            }
            OverrideType::ToolSelection => target.tools = require_tools(payload)?,
            OverrideType::EmbeddingModel => {
                let model = payload.embedding_model.clone().ok_or_else(|| {
                    DomainError::InvalidValue("embedding_model override needs a model".into())
                })?;
                target.embedding_model = Some(model);
            }
            OverrideType::Strategy => {
                let strategy = payload
                    .strategy
                    .as_ref()
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| {
                        DomainError::InvalidValue("strategy override needs a strategy".into())
                    })?;
                target.strategy = strategy.clone();
            }
        }
        target.reasoning = format!("manual override ({})", self.as_str());
        Ok(target)
    }
}

fn require_tools(payload: &OverridePayload) -> Result<Vec<String>, DomainError> {
    let proposal = StrategyProposal::new(payload.tools.clone(), "");
    if proposal.tools.is_empty() {
        return Err(DomainError::NoToolsAvailable);
    }
    Ok(proposal.tools)
}

/// Outcome of one tool in a run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Summary of a finished decision pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResults {
    pub decision_id: DecisionId,
    pub status: DecisionStatus,
    pub tools: Vec<ToolOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_quality: Option<f64>,
}

impl ExecutionResults {
    pub fn summarize(decision: &Decision, executions: &[ToolExecution]) -> Self {
        let mut ordered: Vec<&ToolExecution> = executions.iter().collect();
        ordered.sort_by_key(|e| e.execution_order);
        Self {
            decision_id: decision.id.clone(),
            status: decision.status,
            tools: ordered
                .iter()
                .map(|e| ToolOutcome {
                    tool: e.tool_name.clone(),
                    status: e.status().to_string(),
                    quality: e.state.quality().map(|q| q.value()),
                    duration_ms: e.state.duration_ms(),
                })
                .collect(),
            runtime_ms: decision.actual_runtime_ms,
            mean_quality: mean_quality(executions),
        }
    }

    fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.tool.as_str()).collect()
    }
}

/// Overridden run measured against the original run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceComparison {
    pub schema_version: u32,
    /// Overridden minus original; negative means faster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_delta_ms: Option<i64>,
    /// Overridden minus original mean quality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_delta: Option<f64>,
    #[serde(default)]
    pub tools_added: Vec<String>,
    #[serde(default)]
    pub tools_removed: Vec<String>,
}

impl PerformanceComparison {
    pub fn compare(original: &ExecutionResults, overridden: &ExecutionResults) -> Self {
        let before = original.tool_names();
        let after = overridden.tool_names();
        Self {
            schema_version: COMPARISON_SCHEMA_VERSION,
            runtime_delta_ms: match (original.runtime_ms, overridden.runtime_ms) {
                (Some(a), Some(b)) => Some(b as i64 - a as i64),
                _ => None,
            },
            quality_delta: match (original.mean_quality, overridden.mean_quality) {
                (Some(a), Some(b)) => Some(b - a),
                _ => None,
            },
            tools_added: after
                .iter()
                .filter(|t| !before.contains(t))
                .map(|t| t.to_string())
                .collect(),
            tools_removed: before
                .iter()
                .filter(|t| !after.contains(t))
                .map(|t| t.to_string())
                .collect(),
        }
    }

    /// Whether the overridden run did at least as well on quality.
    pub fn improved(&self) -> bool {
        self.quality_delta.is_some_and(|d| d >= 0.0)
    }
}

/// A recorded manual correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOverride {
    pub id: OverrideId,
    pub decision_id: DecisionId,
    pub researcher: AgentId,
    pub override_type: OverrideType,
    /// Selection of the original decision at record time.
    pub original: StrategyProposal,
    pub overridden: OverridePayload,
    pub justification: String,
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_results: Option<ExecutionResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_decision: Option<DecisionId>,
    pub created_at: DateTime<Utc>,
    pub provenance: ProvenanceLink,
}

impl DecisionOverride {
    /// Whether an override of `override_type` with `overridden` may be
    /// recorded on `decision`.
    pub fn check(
        decision: &Decision,
        override_type: OverrideType,
        overridden: &OverridePayload,
    ) -> Result<(), DomainError> {
        if !decision.is_terminal() {
            return Err(DomainError::InvalidTransition {
                entity: "override",
                from: format!("decision {}", decision.status),
                to: "recorded".to_string(),
            });
        }
        override_type.resolve(&decision.selection(), overridden)?;
        Ok(())
    }

    /// Record an override against a terminal decision.
    pub fn record(
        decision: &Decision,
        researcher: AgentId,
        override_type: OverrideType,
        overridden: OverridePayload,
        justification: impl Into<String>,
        provenance: ProvenanceLink,
    ) -> Result<Self, DomainError> {
        Self::check(decision, override_type, &overridden)?;
        let original = decision.selection();
        Ok(Self {
            id: OverrideId::generate(),
            decision_id: decision.id.clone(),
            researcher,
            override_type,
            original,
            overridden,
            justification: justification.into(),
            applied: false,
            applied_at: None,
            execution_results: None,
            performance: None,
            derived_decision: None,
            created_at: Utc::now(),
            provenance,
        })
    }

    /// Selection to re-execute with; fails once applied.
    pub fn target_selection(&self) -> Result<StrategyProposal, DomainError> {
        if self.applied {
            return Err(DomainError::OverrideAlreadyApplied);
        }
        self.override_type.resolve(&self.original, &self.overridden)
    }

    /// Flip `applied` false -> true and attach the run outcome.
    pub fn mark_applied(
        &mut self,
        results: ExecutionResults,
        performance: PerformanceComparison,
    ) -> Result<(), DomainError> {
        if self.applied {
            return Err(DomainError::OverrideAlreadyApplied);
        }
        self.applied = true;
        self.applied_at = Some(Utc::now());
        self.derived_decision = Some(results.decision_id.clone());
        self.execution_results = Some(results);
        self.performance = Some(performance);
        Ok(())
    }
}
