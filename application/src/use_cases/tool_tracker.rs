//! Tool execution tracker use case
//!
//! Records one [`ToolExecution`] per tool a decision runs and drives the
//! tools through the [`ToolInvoker`] port.
//!
//! # Run order
//!
//! Tools run one after another in `execution_order`. A tool the registry
//! marks independent is started in the background and only its completion is
//! awaited before the run returns. After an error or timeout every remaining
//! tool is recorded as skipped.

use crate::config::ExecutionParams;
use crate::error::EngineError;
use crate::ports::repository::{DecisionRepository, ToolExecutionRepository};
use crate::ports::tool_invoker::{ToolInvocationError, ToolInvoker, ToolOutput, ToolRequest};
use crate::use_cases::provenance::ProvenanceRecorder;
use crate::use_cases::shared::load_decision;
use chrono::Utc;
use semantra_domain::{
    ActivityKind, AgentId, Decision, DecisionId, DomainError, EntityKind, ExecutionId,
    ExecutionStatus, ProvenanceLink, ToolExecution, ToolRegistry, UnitScore,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How one invocation ended, before it is written back.
#[derive(Debug)]
enum Invocation {
    Completed(ToolOutput),
    Failed(String),
    TimedOut,
}

pub struct ToolExecutionTracker {
    executions: Arc<dyn ToolExecutionRepository>,
    decisions: Arc<dyn DecisionRepository>,
    invoker: Arc<dyn ToolInvoker>,
    provenance: ProvenanceRecorder,
    registry: Arc<ToolRegistry>,
    max_tool_retries: u32,
    tool_timeout: Duration,
    actor: AgentId,
}

impl ToolExecutionTracker {
    pub fn new(
        executions: Arc<dyn ToolExecutionRepository>,
        decisions: Arc<dyn DecisionRepository>,
        invoker: Arc<dyn ToolInvoker>,
        provenance: ProvenanceRecorder,
        registry: Arc<ToolRegistry>,
        params: &ExecutionParams,
        actor: AgentId,
    ) -> Self {
        Self {
            executions,
            decisions,
            invoker,
            provenance,
            registry,
            max_tool_retries: params.max_tool_retries,
            tool_timeout: params.tool_timeout,
            actor,
        }
    }

    // ==================== Recording ====================

    /// Open a running execution for `tool` at `order`.
    ///
    /// The decision must be running and `order` unused within it.
    pub async fn record_execution(
        &self,
        decision_id: &DecisionId,
        tool: &str,
        order: u32,
    ) -> Result<ToolExecution, EngineError> {
        let decision = self.open_decision(decision_id, order).await?;
        let activity = self
            .provenance
            .begin(
                ActivityKind::ToolExecution,
                &self.actor,
                json!({ "decision": decision.id, "tool": tool, "order": order }),
            )
            .await?;
        let mut execution = ToolExecution::start(
            decision.id.clone(),
            tool,
            order,
            ProvenanceLink::pending(activity.clone()),
        );
        execution.provenance = self
            .provenance
            .generated(
                &activity,
                EntityKind::ToolExecution,
                &execution,
                std::slice::from_ref(&decision.provenance.entity),
            )
            .await?;
        self.executions.insert(&execution).await?;
        debug!("Tool {} started for {} (#{})", tool, decision.id, order);
        Ok(execution)
    }

    /// Record a tool that will not run.
    pub async fn skip(
        &self,
        decision_id: &DecisionId,
        tool: &str,
        order: u32,
        reason: &str,
    ) -> Result<ToolExecution, EngineError> {
        let decision = self.open_decision(decision_id, order).await?;
        let activity = self
            .provenance
            .begin(
                ActivityKind::ToolExecution,
                &self.actor,
                json!({ "decision": decision.id, "tool": tool, "order": order, "skipped": reason }),
            )
            .await?;
        let mut execution = ToolExecution::skipped(
            decision.id.clone(),
            tool,
            order,
            reason,
            ProvenanceLink::pending(activity.clone()),
        );
        execution.provenance = self
            .provenance
            .generated(
                &activity,
                EntityKind::ToolExecution,
                &execution,
                std::slice::from_ref(&decision.provenance.entity),
            )
            .await?;
        self.executions.insert(&execution).await?;
        debug!("Tool {} skipped for {}: {}", tool, decision.id, reason);
        Ok(execution)
    }

    async fn open_decision(&self, decision_id: &DecisionId, order: u32) -> Result<Decision, EngineError> {
        let decision = load_decision(self.decisions.as_ref(), decision_id).await?;
        if decision.is_terminal() {
            return Err(DomainError::AlreadyTerminal {
                entity: "decision",
                status: decision.status.to_string(),
            }
            .into());
        }
        let taken = self
            .executions
            .list_for_decision(decision_id)
            .await?
            .iter()
            .any(|e| e.execution_order == order);
        if taken {
            return Err(EngineError::invalid(format!(
                "execution order {order} is already used by decision {decision_id}"
            )));
        }
        Ok(decision)
    }

    pub async fn complete(
        &self,
        id: &ExecutionId,
        output_summary: &str,
        quality: f64,
    ) -> Result<ToolExecution, EngineError> {
        let quality = UnitScore::new("quality", quality)?;
        self.transition(id, ExecutionStatus::Completed, |e| e.complete(output_summary, quality))
            .await
    }

    pub async fn fail(&self, id: &ExecutionId, message: &str) -> Result<ToolExecution, EngineError> {
        self.transition(id, ExecutionStatus::Error, |e| e.fail(message))
            .await
    }

    pub async fn time_out(&self, id: &ExecutionId) -> Result<ToolExecution, EngineError> {
        self.transition(id, ExecutionStatus::Timeout, |e| e.time_out())
            .await
    }

    async fn transition(
        &self,
        id: &ExecutionId,
        to: ExecutionStatus,
        apply: impl FnOnce(&mut ToolExecution) -> Result<(), DomainError> + Send,
    ) -> Result<ToolExecution, EngineError> {
        let mut execution = self
            .executions
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("tool execution", id))?;
        apply(&mut execution)?;
        let link = self
            .provenance
            .revise(
                ActivityKind::ToolExecution,
                &self.actor,
                json!({ "execution": id, "status": to.as_str() }),
                EntityKind::ToolExecution,
                &execution,
                &execution.provenance,
            )
            .await?;
        execution.provenance = link;
        self.executions.update(&execution).await?;
        Ok(execution)
    }

    // ==================== Queries ====================

    pub async fn executions(&self, decision_id: &DecisionId) -> Result<Vec<ToolExecution>, EngineError> {
        Ok(self.executions.list_for_decision(decision_id).await?)
    }

    /// Whether no execution of the decision is still running.
    pub async fn all_terminal(&self, decision_id: &DecisionId) -> Result<bool, EngineError> {
        Ok(self
            .executions
            .list_for_decision(decision_id)
            .await?
            .iter()
            .all(ToolExecution::is_terminal))
    }

    // ==================== Running ====================

    /// Run every tool of a running decision before its deadline.
    ///
    /// Returns the executions in `execution_order`, all terminal. When
    /// recording fails midway, background tools are aborted and executions
    /// left running are marked `error` before the error is returned.
    pub async fn run(&self, decision: &Decision) -> Result<Vec<ToolExecution>, EngineError> {
        match self.run_tools(decision).await {
            Ok(executions) => Ok(executions),
            Err(e) => {
                warn!("Tool run for {} aborted: {}", decision.id, e);
                self.abandon(&decision.id, &format!("tool run aborted: {e}")).await;
                Err(e)
            }
        }
    }

    /// Fail every execution of the decision that is still running.
    async fn abandon(&self, decision_id: &DecisionId, message: &str) {
        let executions = match self.executions.list_for_decision(decision_id).await {
            Ok(executions) => executions,
            Err(e) => {
                warn!("Could not list executions of {}: {}", decision_id, e);
                return;
            }
        };
        for execution in executions.iter().filter(|e| !e.is_terminal()) {
            if let Err(e) = self.fail(&execution.id, message).await {
                warn!("Could not fail execution {}: {}", execution.id, e);
            }
        }
    }

    async fn run_tools(&self, decision: &Decision) -> Result<Vec<ToolExecution>, EngineError> {
        let deadline = Instant::now() + decision.remaining(Utc::now());
        let mut background = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, ExecutionId> = HashMap::new();
        let mut halted: Option<String> = None;

        info!("Running {} tool(s) for {}", decision.tools.len(), decision.id);

        for (index, tool) in decision.tools.iter().enumerate() {
            let order = index as u32 + 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if halted.is_none() && remaining.is_zero() {
                halted = Some("decision deadline passed".to_string());
            }
            if let Some(reason) = &halted {
                self.skip(&decision.id, tool, order, reason).await?;
                continue;
            }

            let execution = self.record_execution(&decision.id, tool, order).await?;
            let request = ToolRequest {
                tool: tool.clone(),
                document_id: decision.characteristics.document_id.clone(),
                term: decision.term.clone(),
                params: json!({
                    "embedding_model": decision.embedding_model.as_str(),
                    "strategy": decision.strategy,
                    "goal": decision.goal,
                }),
            };
            let budget = self.tool_timeout.min(remaining);
            let invoker = Arc::clone(&self.invoker);
            let retries = self.max_tool_retries;

            if self.registry.get(tool).is_some_and(|t| t.independent) {
                let handle = background.spawn(invoke_with_retries(invoker, request, budget, retries));
                pending.insert(handle.id(), execution.id);
                continue;
            }

            let outcome = invoke_with_retries(invoker, request, budget, retries).await;
            let status = self.settle(&execution.id, outcome).await?;
            if status.is_failure() {
                warn!("Tool {} ended with {} for {}", tool, status, decision.id);
                halted = Some(format!("{tool} ended with {status}"));
            }
        }

        while let Some(joined) = background.join_next_with_id().await {
            match joined {
                Ok((task, outcome)) => {
                    if let Some(id) = pending.remove(&task) {
                        self.settle(&id, outcome).await?;
                    }
                }
                Err(e) => {
                    warn!("Independent tool task failed: {}", e);
                    if let Some(id) = pending.remove(&e.id()) {
                        self.fail(&id, &format!("tool task failed: {e}")).await?;
                    }
                }
            }
        }

        self.executions(&decision.id).await
    }

    async fn settle(&self, id: &ExecutionId, outcome: Invocation) -> Result<ExecutionStatus, EngineError> {
        let execution = match outcome {
            Invocation::Completed(output) => {
                if UnitScore::new("quality", output.quality).is_ok() {
                    self.complete(id, &output.summary, output.quality).await?
                } else {
                    let message = format!("tool reported quality {} outside [0, 1]", output.quality);
                    self.fail(id, &message).await?
                }
            }
            Invocation::Failed(message) => self.fail(id, &message).await?,
            Invocation::TimedOut => self.time_out(id).await?,
        };
        Ok(execution.status())
    }
}

/// Invoke a tool, retrying failures while the budget lasts.
///
/// The budget covers every attempt; running out of it is a timeout.
async fn invoke_with_retries(
    invoker: Arc<dyn ToolInvoker>,
    request: ToolRequest,
    budget: Duration,
    retries: u32,
) -> Invocation {
    let deadline = Instant::now() + budget;
    let mut last_error = String::from("tool was not invoked");
    for attempt in 1..=retries.saturating_add(1) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Invocation::TimedOut;
        }
        match tokio::time::timeout(remaining, invoker.invoke(&request)).await {
            Ok(Ok(output)) => return Invocation::Completed(output),
            Ok(Err(ToolInvocationError::Timeout)) | Err(_) => return Invocation::TimedOut,
            Ok(Err(e)) => {
                warn!("Tool {} attempt {} failed: {}", request.tool, attempt, e);
                last_error = e.to_string();
            }
        }
    }
    Invocation::Failed(last_error)
}
