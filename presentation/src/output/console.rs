//! Console output for decisions, feedback, overrides and patterns

use colored::{ColoredString, Colorize};
use semantra_application::AppliedOverride;
use semantra_domain::{
    Agent, ConfigIssue, ConsensusRun, Decision, DecisionStatus, ExperimentRun, ExperimentStage,
    Feedback, LearningPattern, PatternStatus, ProvEntity, Severity, ToolExecution,
    ToolExecutionState,
};
use serde::Serialize;

/// Formats engine results for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Turn ANSI colors on or off for everything printed afterwards.
    pub fn set_color(enabled: bool) {
        colored::control::set_override(enabled);
    }

    /// Format any result as pretty JSON
    pub fn format_json<T: Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }

    // ==================== Decisions ====================

    /// One decision with its tool runs, consensus passes and lineage.
    pub fn format_decision(
        decision: &Decision,
        executions: &[ToolExecution],
        consensus: &[ConsensusRun],
        lineage: &[ProvEntity],
    ) -> String {
        let mut output = String::new();
        output.push_str(&Self::header(&format!("Decision {}", decision.id)));
        output.push('\n');

        let c = &decision.characteristics;
        Self::field(&mut output, "Document:", &format!(
            "{} ({}, {} words, {})",
            c.document_id, c.domain, c.word_count, c.temporal_span
        ));
        Self::field(&mut output, "Term:", &decision.term);
        Self::field(&mut output, "Goal:", &decision.goal);
        Self::field(&mut output, "Status:", &Self::status(decision.status).to_string());
        if let Some(experiment) = &decision.experiment_id {
            Self::field(&mut output, "Experiment:", experiment.as_str());
        }
        if let Some(original) = &decision.derived_from {
            Self::field(&mut output, "Derived from:", original.as_str());
        }
        if let Some(message) = &decision.error_message {
            Self::field(&mut output, "Error:", &message.red().to_string());
        }

        output.push_str(&Self::section_header("Selection"));
        Self::field(&mut output, "Tools:", &Self::list_or_none(&decision.tools));
        Self::field(&mut output, "Embedding:", &decision.embedding_model.to_string());
        Self::field(&mut output, "Strategy:", &decision.strategy);
        Self::field(&mut output, "Confidence:", &Self::confidence(decision));
        if !decision.reasoning.is_empty() {
            output.push_str(&format!("\n{}\n", Self::indent(&decision.reasoning, "  ")));
        }

        let f = &decision.factors;
        output.push_str(&Self::section_header("Factors"));
        for (name, factor) in [
            ("text complexity", &f.text_complexity),
            ("domain match", &f.domain_match),
            ("temporal span", &f.temporal_span),
        ] {
            output.push_str(&format!(
                "  {:<16} {} x {:.1}  {}\n",
                name,
                factor.score,
                factor.weight,
                factor.note.dimmed()
            ));
        }
        if !f.dropped_tools.is_empty() {
            output.push_str(&format!(
                "  {} {}\n",
                "dropped:".yellow(),
                f.dropped_tools.join(", ")
            ));
        }
        if let Some(merge) = &f.pattern_merge {
            output.push_str(&format!(
                "  pattern {} v{} (score {}) merged\n",
                merge.pattern_id, merge.pattern_version, merge.pattern_score
            ));
        }

        if !executions.is_empty() {
            output.push_str(&Self::section_header("Tool Executions"));
            for execution in executions {
                output.push_str(&Self::format_execution(execution));
            }
        }

        if !consensus.is_empty() {
            output.push_str(&Self::section_header("Consensus"));
            for run in consensus {
                let verdict = &run.verdict;
                let reached = if verdict.consensus_reached {
                    "reached".green()
                } else {
                    "not reached".red()
                };
                output.push_str(&format!(
                    "  {} {} (confidence {}, leader {}, models {})\n",
                    run.id,
                    reached,
                    verdict.consensus_confidence,
                    verdict.leader,
                    verdict.models().join(", ")
                ));
                for area in &verdict.disagreements {
                    output.push_str(&format!(
                        "    {} {} vs {}: agreement {:.2}\n",
                        "-".yellow(),
                        area.models.0,
                        area.models.1,
                        area.agreement
                    ));
                }
            }
        }

        if !lineage.is_empty() {
            output.push_str(&Self::section_header("Lineage"));
            for entity in lineage {
                output.push_str(&format!(
                    "  {} {} {}\n",
                    entity.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    entity.kind.to_string().cyan(),
                    entity.id
                ));
            }
        }

        output.push_str(&Self::footer());
        output
    }

    /// One line per decision.
    pub fn format_decisions(decisions: &[Decision]) -> String {
        if decisions.is_empty() {
            return format!("{}\n", "No decisions.".dimmed());
        }
        let mut output = String::new();
        for decision in decisions {
            let review = if decision.needs_review {
                " review".yellow().to_string()
            } else {
                String::new()
            };
            output.push_str(&format!(
                "{:<10} {} {} [{}] {}{}\n",
                Self::status(decision.status),
                decision.id,
                decision.characteristics.document_id.to_string().bold(),
                decision.tools.join(", "),
                decision.confidence,
                review
            ));
        }
        output
    }

    fn format_execution(execution: &ToolExecution) -> String {
        let order = format!("#{}", execution.execution_order);
        match &execution.state {
            ToolExecutionState::Completed {
                output_summary,
                quality,
                ..
            } => format!(
                "  {} {} {} quality {} {}\n{}\n",
                "v".green(),
                order,
                execution.tool_name.bold(),
                quality,
                Self::duration(execution),
                Self::indent(output_summary, "      ").dimmed()
            ),
            ToolExecutionState::Error { error_message, .. } => format!(
                "  {} {} {} {}\n      {}\n",
                "x".red(),
                order,
                execution.tool_name.bold(),
                Self::duration(execution),
                error_message.red()
            ),
            ToolExecutionState::Timeout { .. } => format!(
                "  {} {} {} timed out {}\n",
                "x".red(),
                order,
                execution.tool_name.bold(),
                Self::duration(execution)
            ),
            ToolExecutionState::Skipped { reason } => format!(
                "  {} {} {} skipped: {}\n",
                "-".dimmed(),
                order,
                execution.tool_name.bold(),
                reason
            ),
            ToolExecutionState::Running { .. } => format!(
                "  {} {} {} running\n",
                "~".yellow(),
                order,
                execution.tool_name.bold()
            ),
        }
    }

    // ==================== Experiments ====================

    pub fn format_experiment(run: &ExperimentRun) -> String {
        let mut output = String::new();
        output.push_str(&Self::header(&format!("Experiment {}", run.id)));
        output.push('\n');
        Self::field(&mut output, "Term:", &run.term);
        Self::field(&mut output, "Goal:", &run.goal);
        Self::field(&mut output, "Stage:", &Self::stage(run.stage).to_string());
        Self::field(&mut output, "Documents:", &run.documents.len().to_string());
        output.push_str(&format!(
            "{} {} completed, {} error, {} timeout, {} running\n",
            "Decisions:".cyan().bold(),
            run.counts.completed.to_string().green(),
            run.counts.error.to_string().red(),
            run.counts.timeout.to_string().yellow(),
            run.counts.running
        ));
        if let Some(failure) = &run.failure {
            Self::field(&mut output, "Failure:", &failure.red().to_string());
        }
        output.push_str(&Self::footer());
        output
    }

    pub fn format_experiments(runs: &[ExperimentRun]) -> String {
        if runs.is_empty() {
            return format!("{}\n", "No experiments.".dimmed());
        }
        runs.iter()
            .map(|run| {
                format!(
                    "{:<18} {} '{}' {} document(s), {} completed\n",
                    Self::stage(run.stage),
                    run.id,
                    run.term,
                    run.documents.len(),
                    run.counts.completed
                )
            })
            .collect()
    }

    // ==================== Feedback and overrides ====================

    pub fn format_feedback(feedback: &[Feedback]) -> String {
        if feedback.is_empty() {
            return format!("{}\n", "No feedback.".dimmed());
        }
        let mut output = String::new();
        for item in feedback {
            output.push_str(&format!(
                "{:<10} {} on {} by {}: {} / {} (confidence {})\n",
                item.status.to_string().cyan(),
                item.id,
                item.decision_id,
                item.researcher,
                item.feedback_type.as_str(),
                item.agreement.as_str(),
                item.confidence_assessment
            ));
            if !item.reasoning.is_empty() {
                output.push_str(&format!("{}\n", Self::indent(&item.reasoning, "    ").dimmed()));
            }
        }
        output
    }

    pub fn format_override(applied: &AppliedOverride) -> String {
        let record = &applied.record;
        let mut output = String::new();
        output.push_str(&Self::header(&format!("Override {}", record.id)));
        output.push('\n');
        Self::field(&mut output, "Decision:", record.decision_id.as_str());
        Self::field(&mut output, "Type:", record.override_type.as_str());
        Self::field(&mut output, "Before:", &Self::list_or_none(&record.original.tools));
        Self::field(&mut output, "After:", &Self::list_or_none(&applied.decision.tools));
        Self::field(&mut output, "Re-executed as:", &format!(
            "{} ({})",
            applied.decision.id,
            Self::status(applied.decision.status)
        ));
        if let Some(performance) = &record.performance {
            if let Some(delta) = performance.runtime_delta_ms {
                Self::field(&mut output, "Runtime delta:", &format!("{:+} ms", delta));
            }
            if let Some(delta) = performance.quality_delta {
                Self::field(&mut output, "Quality delta:", &format!("{:+.3}", delta));
            }
        }
        output.push_str(&Self::footer());
        output
    }

    // ==================== Patterns and agents ====================

    pub fn format_patterns(patterns: &[LearningPattern]) -> String {
        if patterns.is_empty() {
            return format!("{}\n", "No patterns learned yet.".dimmed());
        }
        let mut output = String::new();
        for pattern in patterns {
            let status = match pattern.status {
                PatternStatus::Active => pattern.status.to_string().green(),
                PatternStatus::Experimental => pattern.status.to_string().yellow(),
                _ => pattern.status.to_string().red(),
            };
            output.push_str(&format!(
                "{:<13} {} {} score {} ({}/{} successful)\n",
                status,
                pattern.id,
                pattern.signature.to_string().bold(),
                pattern.score(),
                pattern.successes,
                pattern.times_applied
            ));
            let recommendation = &pattern.recommendation;
            if !recommendation.tools.is_empty() {
                output.push_str(&format!("    tools: {}\n", recommendation.tools.join(", ")));
            }
            if let Some(model) = &recommendation.embedding_model {
                output.push_str(&format!("    embedding: {}\n", model));
            }
            if let Some(strategy) = &recommendation.strategy {
                output.push_str(&format!("    strategy: {}\n", strategy));
            }
        }
        output
    }

    pub fn format_agents(agents: &[Agent]) -> String {
        agents
            .iter()
            .map(|agent| {
                format!(
                    "{} {:<15} {} ({} reference(s))\n",
                    agent.id,
                    agent.kind.as_str().cyan(),
                    agent.kind.name().bold(),
                    agent.reference_count
                )
            })
            .collect()
    }

    // ==================== Configuration ====================

    pub fn format_config_issues(issues: &[ConfigIssue]) -> String {
        issues
            .iter()
            .map(|issue| match issue.severity {
                Severity::Error => format!("{} {}\n", "error:".red().bold(), issue.message),
                Severity::Warning => {
                    format!("{} {}\n", "warning:".yellow().bold(), issue.message)
                }
            })
            .collect()
    }

    // ==================== Helpers ====================

    fn status(status: DecisionStatus) -> ColoredString {
        match status {
            DecisionStatus::Completed => status.as_str().green(),
            DecisionStatus::Running => status.as_str().yellow(),
            DecisionStatus::Error | DecisionStatus::Timeout => status.as_str().red(),
        }
    }

    fn stage(stage: ExperimentStage) -> ColoredString {
        match stage {
            ExperimentStage::Completed => stage.as_str().green(),
            ExperimentStage::Failed => stage.as_str().red(),
            _ => stage.as_str().yellow(),
        }
    }

    fn confidence(decision: &Decision) -> String {
        let value = decision.confidence.to_string();
        let mut text = if decision.confidence.value() >= 0.7 {
            value.green().to_string()
        } else if decision.confidence.value() >= 0.4 {
            value.yellow().to_string()
        } else {
            value.red().to_string()
        };
        if decision.needs_review {
            text.push_str(&format!(" {}", "(needs review)".yellow()));
        }
        if decision.validated {
            text.push_str(&format!(" {}", "(validated)".green()));
        }
        text
    }

    fn duration(execution: &ToolExecution) -> String {
        execution
            .state
            .duration_ms()
            .map(|ms| format!("{}ms", ms).dimmed().to_string())
            .unwrap_or_default()
    }

    fn list_or_none(items: &[String]) -> String {
        if items.is_empty() {
            "(none)".dimmed().to_string()
        } else {
            items.join(", ")
        }
    }

    fn field(output: &mut String, label: &str, value: &str) {
        output.push_str(&format!("{} {}\n", label.cyan().bold(), value));
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn footer() -> String {
        format!("\n{}\n", "=".repeat(60).cyan())
    }

    /// Indent a multi-line string
    pub fn indent(text: &str, prefix: &str) -> String {
        text.lines()
            .map(|line| format!("{}{}", prefix, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
