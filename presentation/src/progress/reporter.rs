//! Progress reporting for experiment runs

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use semantra_application::ExperimentProgress;
use semantra_domain::{Decision, DecisionStatus, ExperimentRun, ExperimentStage};
use std::sync::Mutex;

/// Reports experiment progress with one bar per stage
pub struct ProgressReporter {
    multi: MultiProgress,
    stage_bar: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            stage_bar: Mutex::new(None),
        }
    }

    fn stage_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn stage_display_name(stage: ExperimentStage) -> &'static str {
        match stage {
            ExperimentStage::Analyzing => "Analyzing documents",
            ExperimentStage::StrategyProposed => "Proposing strategies",
            ExperimentStage::Executing => "Executing tools",
            ExperimentStage::Pending => "Pending",
            ExperimentStage::Completed => "Completed",
            ExperimentStage::Failed => "Failed",
        }
    }

    /// Finish the current bar, if any.
    fn finish_bar(&self) {
        if let Ok(mut guard) = self.stage_bar.lock()
            && let Some(pb) = guard.take()
        {
            pb.finish_with_message("done".green().to_string());
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn decision_line(decision: &Decision) -> String {
    let document = decision.characteristics.document_id.as_str();
    match decision.status {
        DecisionStatus::Completed => format!("{} {}", "v".green(), document),
        DecisionStatus::Running => format!("{} {}", "~".yellow(), document),
        DecisionStatus::Error | DecisionStatus::Timeout => {
            format!("{} {} ({})", "x".red(), document, decision.status)
        }
    }
}

impl ExperimentProgress for ProgressReporter {
    fn on_stage_start(&self, stage: ExperimentStage, total: usize) {
        self.finish_bar();

        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::stage_style());
        pb.set_prefix(Self::stage_display_name(stage));
        pb.set_message("Starting...");

        if let Ok(mut guard) = self.stage_bar.lock() {
            *guard = Some(pb);
        }
    }

    fn on_decision(&self, _stage: ExperimentStage, decision: &Decision) {
        if let Ok(guard) = self.stage_bar.lock()
            && let Some(pb) = guard.as_ref()
        {
            pb.set_message(decision_line(decision));
            pb.inc(1);
        }
    }

    fn on_finished(&self, run: &ExperimentRun) {
        self.finish_bar();
        let _ = self.multi.println(format!(
            "{} {} {}",
            "Experiment".bold(),
            run.id,
            match run.stage {
                ExperimentStage::Completed => run.stage.as_str().green(),
                _ => run.stage.as_str().red(),
            }
        ));
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress;

impl ExperimentProgress for SimpleProgress {
    fn on_stage_start(&self, stage: ExperimentStage, total: usize) {
        println!(
            "{} {} ({} documents)",
            "->".cyan(),
            ProgressReporter::stage_display_name(stage).bold(),
            total
        );
    }

    fn on_decision(&self, _stage: ExperimentStage, decision: &Decision) {
        println!("  {}", decision_line(decision));
    }

    fn on_finished(&self, run: &ExperimentRun) {
        println!("{} {} {}", "Experiment".bold(), run.id, run.stage);
    }
}
