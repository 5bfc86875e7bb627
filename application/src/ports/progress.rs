//! Progress notification port
//!
//! Defines the interface for reporting progress during an experiment run.

use semantra_domain::{Decision, ExperimentRun, ExperimentStage};

/// Callback for progress updates during an experiment
///
/// Implementations live in the presentation layer and can display
/// progress in various ways (progress bars, logs, etc.)
pub trait ExperimentProgress: Send + Sync {
    /// Called when a stage starts
    fn on_stage_start(&self, stage: ExperimentStage, total: usize);

    /// Called when one decision finishes the current stage
    fn on_decision(&self, stage: ExperimentStage, decision: &Decision);

    /// Called when the run reaches a terminal stage
    fn on_finished(&self, _run: &ExperimentRun) {}
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoProgress;

impl ExperimentProgress for NoProgress {
    fn on_stage_start(&self, _stage: ExperimentStage, _total: usize) {}
    fn on_decision(&self, _stage: ExperimentStage, _decision: &Decision) {}
}
