//! Run experiment use case
//!
//! Processes a batch of documents for one term and goal.
//!
//! # Flow
//!
//! ```text
//! pending ──> analyzing ──> strategy_proposed ──> executing ──> completed
//!                  │               │                  │
//!                  └───────────────┴──────────────────┴──────> failed
//! ```
//!
//! Every stage fans out over the documents with at most
//! `worker_pool_size` units in flight. The run completes when at least one
//! decision completed.

use crate::error::EngineError;
use crate::ports::document_service::DocumentService;
use crate::ports::progress::ExperimentProgress;
use crate::ports::repository::{DecisionFilter, ExperimentRepository};
use crate::use_cases::orchestrator::{DecisionOrchestrator, ProposeInput};
use crate::use_cases::provenance::ProvenanceRecorder;
use semantra_domain::{
    ActivityKind, AgentId, Decision, DecisionStatus, DocumentCharacteristics, DocumentId,
    EntityKind, ExecutionStatus, ExperimentId, ExperimentRun, ExperimentStage, ProvenanceLink,
    TermContext,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Input for an experiment run
#[derive(Debug, Clone)]
pub struct ExperimentRequest {
    /// Generated when absent.
    pub id: Option<ExperimentId>,
    /// Every document the document service knows when empty.
    pub documents: Vec<DocumentId>,
    pub term: TermContext,
    pub goal: String,
}

impl ExperimentRequest {
    pub fn new(term: TermContext, goal: impl Into<String>) -> Self {
        Self {
            id: None,
            documents: Vec::new(),
            term,
            goal: goal.into(),
        }
    }

    pub fn with_id(mut self, id: ExperimentId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_documents(mut self, documents: Vec<DocumentId>) -> Self {
        self.documents = documents;
        self
    }
}

pub struct ExperimentRunner {
    orchestrator: Arc<DecisionOrchestrator>,
    experiments: Arc<dyn ExperimentRepository>,
    documents: Arc<dyn DocumentService>,
    provenance: ProvenanceRecorder,
    pool_size: usize,
    actor: AgentId,
}

impl ExperimentRunner {
    pub fn new(
        orchestrator: Arc<DecisionOrchestrator>,
        experiments: Arc<dyn ExperimentRepository>,
        documents: Arc<dyn DocumentService>,
        provenance: ProvenanceRecorder,
        pool_size: usize,
        actor: AgentId,
    ) -> Self {
        Self {
            orchestrator,
            experiments,
            documents,
            provenance,
            pool_size: pool_size.max(1),
            actor,
        }
    }

    /// Run the experiment to a terminal stage.
    ///
    /// On cancellation the run is marked failed, decisions it left running
    /// are finalized as `error`, and `Cancelled` is returned.
    pub async fn run(
        &self,
        request: ExperimentRequest,
        progress: &dyn ExperimentProgress,
        cancel: CancellationToken,
    ) -> Result<ExperimentRun, EngineError> {
        let documents = if request.documents.is_empty() {
            self.documents.list().await?
        } else {
            request.documents.clone()
        };
        if documents.is_empty() {
            return Err(EngineError::invalid("experiment has no documents"));
        }

        let mut run = self.open(&request, documents).await?;
        info!(
            "Experiment {}: '{}' over {} document(s)",
            run.id,
            run.term,
            run.documents.len()
        );

        match self.drive(&mut run, &request, progress, &cancel).await {
            Ok(()) => {}
            Err(EngineError::Cancelled) => {
                warn!("Experiment {} cancelled", run.id);
                self.abandon(&run).await?;
                self.fail(&mut run, "cancelled").await?;
                progress.on_finished(&run);
                return Err(EngineError::Cancelled);
            }
            Err(e) => {
                self.fail(&mut run, &e.to_string()).await?;
                progress.on_finished(&run);
                return Err(e);
            }
        }

        progress.on_finished(&run);
        info!(
            "Experiment {} {}: {} completed, {} error, {} timeout",
            run.id, run.stage, run.counts.completed, run.counts.error, run.counts.timeout
        );
        Ok(run)
    }

    async fn open(
        &self,
        request: &ExperimentRequest,
        documents: Vec<DocumentId>,
    ) -> Result<ExperimentRun, EngineError> {
        let id = request.id.clone().unwrap_or_else(ExperimentId::generate);
        let activity = self
            .provenance
            .begin(
                ActivityKind::ExperimentRun,
                &self.actor,
                json!({
                    "experiment": id,
                    "term": request.term.term,
                    "goal": request.goal,
                    "documents": documents,
                }),
            )
            .await?;
        let mut run = ExperimentRun::new(
            id,
            request.term.term.clone(),
            request.goal.clone(),
            documents,
            ProvenanceLink::pending(activity.clone()),
        );
        run.provenance = self
            .provenance
            .generated(&activity, EntityKind::ExperimentRun, &run, &[])
            .await?;
        self.experiments.insert(&run).await?;
        Ok(run)
    }

    async fn drive(
        &self,
        run: &mut ExperimentRun,
        request: &ExperimentRequest,
        progress: &dyn ExperimentProgress,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        // Analyzing
        self.advance(run, ExperimentStage::Analyzing).await?;
        progress.on_stage_start(ExperimentStage::Analyzing, run.documents.len());
        let analyzed = self
            .fan_out(
                run.documents.clone(),
                cancel,
                |id| {
                    let documents = Arc::clone(&self.documents);
                    async move {
                        let result = documents.characteristics(&id).await;
                        (id, result)
                    }
                },
                |_| {},
            )
            .await?;
        let mut inputs: Vec<DocumentCharacteristics> = Vec::new();
        for (id, result) in analyzed {
            match result {
                Ok(characteristics) => inputs.push(characteristics),
                Err(e) => warn!("Skipping document {}: {}", id, e),
            }
        }
        if inputs.is_empty() {
            return Err(EngineError::ExternalCallFailure(
                "no document could be analyzed".to_string(),
            ));
        }
        inputs.sort_by(|a, b| a.document_id.cmp(&b.document_id));

        // Strategy proposal
        self.advance(run, ExperimentStage::StrategyProposed).await?;
        progress.on_stage_start(ExperimentStage::StrategyProposed, inputs.len());
        let experiment_id = run.id.clone();
        let proposed = self
            .fan_out(
                inputs,
                cancel,
                |characteristics| {
                    let orchestrator = Arc::clone(&self.orchestrator);
                    let input = ProposeInput::new(
                        characteristics,
                        request.term.clone(),
                        request.goal.clone(),
                    )
                    .with_experiment(Some(experiment_id.clone()));
                    async move { orchestrator.propose(input).await }
                },
                |result| {
                    if let Ok(decision) = result {
                        progress.on_decision(ExperimentStage::StrategyProposed, decision);
                    }
                },
            )
            .await?;
        let mut finished = Vec::new();
        let mut running = Vec::new();
        for result in proposed {
            match result {
                Ok(decision) if decision.is_terminal() => finished.push(decision),
                Ok(decision) => running.push(decision),
                Err(e) => warn!("Proposal failed in experiment {}: {}", run.id, e),
            }
        }
        run.decisions = finished
            .iter()
            .chain(running.iter())
            .map(|d| d.id.clone())
            .collect();

        // Execution
        self.advance(run, ExperimentStage::Executing).await?;
        progress.on_stage_start(ExperimentStage::Executing, running.len());
        let executed = self
            .fan_out(
                running,
                cancel,
                |decision| {
                    let orchestrator = Arc::clone(&self.orchestrator);
                    async move { orchestrator.execute(&decision.id).await }
                },
                |result| {
                    if let Ok(decision) = result {
                        progress.on_decision(ExperimentStage::Executing, decision);
                    }
                },
            )
            .await?;
        for result in executed {
            match result {
                Ok(decision) => finished.push(decision),
                Err(e) => warn!("Execution failed in experiment {}: {}", run.id, e),
            }
        }

        for decision in &finished {
            run.counts.record(decision.status);
        }
        let previous = run.provenance.clone();
        run.conclude()?;
        self.store(run, &previous).await
    }

    /// Run `work` over `items` on the worker pool.
    ///
    /// Results arrive in completion order. Returns `Cancelled` once the
    /// token fires; unfinished work is dropped.
    async fn fan_out<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        cancel: &CancellationToken,
        work: F,
        mut on_done: impl FnMut(&T),
    ) -> Result<Vec<T>, EngineError>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut join_set = JoinSet::new();
        for item in items {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let task = work(item);
            join_set.spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok()?,
                    _ = cancel.cancelled() => return None,
                };
                tokio::select! {
                    output = task => Some(output),
                    _ = cancel.cancelled() => None,
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Some(output)) => {
                    on_done(&output);
                    results.push(output);
                }
                Ok(None) => {}
                Err(e) => warn!("Experiment task failed: {}", e),
            }
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(results)
    }

    /// Finalize whatever this run left running.
    async fn abandon(&self, run: &ExperimentRun) -> Result<(), EngineError> {
        let filter = DecisionFilter {
            experiment: Some(run.id.clone()),
            status: Some(DecisionStatus::Running),
            ..Default::default()
        };
        let tracker = self.orchestrator.tracker();
        for decision in self.orchestrator.decisions(&filter).await? {
            for execution in tracker.executions(&decision.id).await? {
                if execution.status() == ExecutionStatus::Running {
                    tracker.fail(&execution.id, "experiment cancelled").await?;
                }
            }
            self.orchestrator
                .finalize(
                    &decision.id,
                    DecisionStatus::Error,
                    Some("experiment cancelled".to_string()),
                )
                .await?;
            debug!("Abandoned decision {}", decision.id);
        }
        Ok(())
    }

    async fn advance(
        &self,
        run: &mut ExperimentRun,
        stage: ExperimentStage,
    ) -> Result<(), EngineError> {
        let previous = run.provenance.clone();
        run.advance(stage)?;
        self.store(run, &previous).await?;
        debug!("Experiment {} -> {}", run.id, stage);
        Ok(())
    }

    async fn fail(&self, run: &mut ExperimentRun, reason: &str) -> Result<(), EngineError> {
        if run.stage.is_terminal() {
            return Ok(());
        }
        let previous = run.provenance.clone();
        run.fail(reason)?;
        self.store(run, &previous).await
    }

    async fn store(
        &self,
        run: &mut ExperimentRun,
        previous: &ProvenanceLink,
    ) -> Result<(), EngineError> {
        run.provenance = self
            .provenance
            .revise(
                ActivityKind::ExperimentRun,
                &self.actor,
                json!({ "experiment": run.id, "stage": run.stage.as_str() }),
                EntityKind::ExperimentRun,
                &*run,
                previous,
            )
            .await?;
        self.experiments.update(run).await?;
        Ok(())
    }

    // ==================== Queries ====================

    pub async fn experiment(&self, id: &ExperimentId) -> Result<ExperimentRun, EngineError> {
        self.experiments
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("experiment", id))
    }

    pub async fn experiments(&self) -> Result<Vec<ExperimentRun>, EngineError> {
        let mut runs = self.experiments.list().await?;
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }

    /// Decisions of one run, in the order they were registered.
    pub async fn decisions(&self, id: &ExperimentId) -> Result<Vec<Decision>, EngineError> {
        let filter = DecisionFilter {
            experiment: Some(id.clone()),
            ..Default::default()
        };
        let mut decisions = self.orchestrator.decisions(&filter).await?;
        decisions.sort_by_key(|d| d.started_at);
        Ok(decisions)
    }
}
