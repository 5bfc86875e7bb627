//! Subcommand handlers

use anyhow::Result;
use semantra_application::{
    DecisionFilter, DocumentService, Engine, EngineError, ExperimentProgress, ExperimentRequest,
    NoProgress, OverrideRequest, ProposeInput,
};
use semantra_domain::{ConsensusRun, Decision, FeedbackInput, ProvEntity, ToolExecution};
use semantra_infrastructure::ManifestDocumentService;
use semantra_presentation::{
    AgentsCommand, Commands, ConsoleFormatter, DecisionsArgs, FeedbackCommand, OutputConfig,
    OverrideArgs, ProgressReporter, ProposeArgs, RunArgs, SimpleProgress, SubmitFeedbackArgs,
};
use serde::Serialize;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a command needs.
pub struct App {
    pub engine: Engine,
    pub documents: Arc<ManifestDocumentService>,
    pub output: OutputConfig,
}

/// A decision with everything recorded about it.
#[derive(Serialize)]
struct DecisionReport {
    decision: Decision,
    executions: Vec<ToolExecution>,
    consensus: Vec<ConsensusRun>,
    lineage: Vec<ProvEntity>,
}

impl App {
    pub async fn dispatch(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Run(args) => self.run_experiment(args).await,
            Commands::Propose(args) => self.propose(args).await,
            Commands::Execute { decision } => {
                let decision = self.engine.orchestrator().execute(&decision).await?;
                self.show_decision(decision).await
            }
            Commands::Feedback(command) => self.feedback(command).await,
            Commands::Override(args) => self.apply_override(args).await,
            Commands::Validate {
                decision,
                actual_runtime_ms,
            } => {
                let decision = self
                    .engine
                    .orchestrator()
                    .mark_validated(&decision, actual_runtime_ms)
                    .await?;
                self.show_decision(decision).await
            }
            Commands::Patterns { signature } => {
                let patterns = self.engine.learner().list_patterns(signature.as_ref()).await?;
                self.print(&patterns, || ConsoleFormatter::format_patterns(&patterns));
                Ok(())
            }
            Commands::Agents(command) => self.agents(command).await,
            Commands::Decisions(args) => self.decisions(args).await,
            Commands::Experiments => {
                let runs = self.engine.experiments().experiments().await?;
                self.print(&runs, || ConsoleFormatter::format_experiments(&runs));
                Ok(())
            }
        }
    }

    async fn run_experiment(&self, args: RunArgs) -> Result<()> {
        self.check_models().await;
        let mut request = ExperimentRequest::new(args.term.term_context(), args.term.goal.clone())
            .with_documents(args.documents);
        if let Some(id) = args.id {
            request = request.with_id(id);
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; cancelling the experiment");
                    cancel.cancel();
                }
            })
        };

        let progress: Box<dyn ExperimentProgress> = if !self.output.show_progress {
            Box::new(NoProgress)
        } else if std::io::stderr().is_terminal() {
            Box::new(ProgressReporter::new())
        } else {
            Box::new(SimpleProgress)
        };

        let result = self
            .engine
            .experiments()
            .run(request, progress.as_ref(), cancel)
            .await;
        watcher.abort();

        let run = result?;
        self.print(&run, || ConsoleFormatter::format_experiment(&run));
        Ok(())
    }

    async fn propose(&self, args: ProposeArgs) -> Result<()> {
        self.check_models().await;
        let term = args.term.term_context();
        let decision = if args.no_execute {
            let characteristics = self
                .documents
                .characteristics(&args.document)
                .await
                .map_err(EngineError::from)?;
            self.engine
                .orchestrator()
                .propose(ProposeInput::new(characteristics, term, args.term.goal))
                .await?
        } else {
            self.engine
                .orchestrator()
                .process_document(&args.document, term, &args.term.goal, None)
                .await?
        };
        self.show_decision(decision).await
    }

    /// Warn about configured models the LLM provider does not list.
    async fn check_models(&self) {
        match self.engine.orchestrator().unavailable_models().await {
            Ok(missing) if !missing.is_empty() => {
                let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
                warn!("Configured model(s) not served by the provider: {}", names.join(", "));
            }
            Ok(_) => {}
            Err(e) => debug!("Could not list provider models: {}", e),
        }
    }

    async fn feedback(&self, command: FeedbackCommand) -> Result<()> {
        let collector = self.engine.feedback();
        match command {
            FeedbackCommand::Submit(args) => {
                let feedback = collector.submit(feedback_input(args)).await?;
                self.print(&feedback, || {
                    ConsoleFormatter::format_feedback(std::slice::from_ref(&feedback))
                });
            }
            FeedbackCommand::Review {
                feedback,
                outcome,
                reviewer,
            } => {
                let reviewer = reviewer.unwrap_or_else(|| self.engine.actor().clone());
                let feedback = collector.review(&feedback, outcome, &reviewer).await?;
                self.print(&feedback, || {
                    ConsoleFormatter::format_feedback(std::slice::from_ref(&feedback))
                });
            }
            FeedbackCommand::Integrate { feedback } => {
                let (feedback, learning) = collector.integrate(&feedback).await?;
                // The pattern must be stored before the state is saved
                let outcome = learning.wait().await?;
                info!(
                    "Pattern {} {} ({} attempt(s))",
                    outcome.pattern.id,
                    if outcome.created { "created" } else { "updated" },
                    outcome.attempts
                );
                self.print(&feedback, || {
                    let mut text =
                        ConsoleFormatter::format_feedback(std::slice::from_ref(&feedback));
                    text.push_str(&ConsoleFormatter::format_patterns(std::slice::from_ref(
                        &outcome.pattern,
                    )));
                    text
                });
            }
            FeedbackCommand::List { status, decision } => {
                let rows = match decision {
                    Some(id) => {
                        let mut rows = collector.for_decision(&id).await?;
                        rows.retain(|f| status.is_none_or(|s| f.status == s));
                        rows
                    }
                    None => collector.list(status).await?,
                };
                self.print(&rows, || ConsoleFormatter::format_feedback(&rows));
            }
            FeedbackCommand::Pending => {
                let pending = collector.pending_reviews().await?;
                self.print(&pending, || ConsoleFormatter::format_decisions(&pending));
            }
        }
        Ok(())
    }

    async fn apply_override(&self, args: OverrideArgs) -> Result<()> {
        let payload = args.payload();
        let applied = self
            .engine
            .overrides()
            .apply(OverrideRequest {
                decision_id: args.decision,
                researcher: args.researcher,
                override_type: args.override_type,
                payload,
                justification: args.justification,
            })
            .await?;
        let text = ConsoleFormatter::format_override(&applied);
        let record = applied.record.clone();
        let outcome = applied.learning.wait().await?;
        info!("Override {} folded into pattern {}", record.id, outcome.pattern.id);
        self.print(&record, || text);
        Ok(())
    }

    async fn agents(&self, command: AgentsCommand) -> Result<()> {
        let registry = self.engine.agents();
        match command.agent_kind() {
            Some(kind) => {
                let agent = registry.register(kind).await?;
                self.print(&agent, || {
                    ConsoleFormatter::format_agents(std::slice::from_ref(&agent))
                });
            }
            None => {
                let agents = registry.list().await?;
                self.print(&agents, || ConsoleFormatter::format_agents(&agents));
            }
        }
        Ok(())
    }

    async fn decisions(&self, args: DecisionsArgs) -> Result<()> {
        if let Some(id) = args.id {
            let decision = self.engine.orchestrator().decision(&id).await?;
            return self.show_decision(decision).await;
        }
        let filter = DecisionFilter {
            experiment: args.experiment,
            status: args.status,
            needs_review: args.needs_review.then_some(true),
        };
        let decisions = self.engine.orchestrator().decisions(&filter).await?;
        self.print(&decisions, || ConsoleFormatter::format_decisions(&decisions));
        Ok(())
    }

    async fn show_decision(&self, decision: Decision) -> Result<()> {
        let report = self.report(decision).await?;
        self.print(&report, || {
            ConsoleFormatter::format_decision(
                &report.decision,
                &report.executions,
                &report.consensus,
                &report.lineage,
            )
        });
        Ok(())
    }

    async fn report(&self, decision: Decision) -> Result<DecisionReport> {
        let executions = self.engine.orchestrator().executions(&decision.id).await?;
        let consensus = self.engine.consensus().runs_for(&decision.id).await?;
        let lineage = self
            .engine
            .provenance()
            .lineage(&decision.provenance.entity)
            .await?;
        Ok(DecisionReport {
            decision,
            executions,
            consensus,
            lineage,
        })
    }

    fn print<T: Serialize + ?Sized>(&self, value: &T, text: impl FnOnce() -> String) {
        if self.output.is_json() {
            println!("{}", ConsoleFormatter::format_json(value));
        } else {
            print!("{}", text());
        }
    }
}

fn feedback_input(args: SubmitFeedbackArgs) -> FeedbackInput {
    let suggestions = args.suggestions();
    FeedbackInput {
        decision_id: args.decision,
        researcher: args.researcher,
        feedback_type: args.feedback_type,
        agreement: args.agreement,
        confidence_assessment: args.confidence,
        reasoning: args.reasoning,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use semantra_domain::{AgreementLevel, DecisionId, FeedbackType};
    use semantra_presentation::Cli;

    #[test]
    fn test_feedback_input_from_args() {
        let cli = Cli::try_parse_from([
            "semantra",
            "feedback",
            "submit",
            "dec-1",
            "--researcher",
            "agt-1",
            "--type",
            "enhancement",
            "--agreement",
            "strongly_agree",
            "--confidence",
            "0.9",
            "--reasoning",
            "good pick",
            "--suggest-strategy",
            "diachronic",
        ])
        .unwrap();
        let Some(Commands::Feedback(FeedbackCommand::Submit(args))) = cli.command else {
            panic!("expected feedback submit");
        };
        let input = feedback_input(args);
        assert_eq!(input.decision_id, DecisionId::new("dec-1"));
        assert_eq!(input.feedback_type, FeedbackType::Enhancement);
        assert_eq!(input.agreement, AgreementLevel::StronglyAgree);
        assert_eq!(input.reasoning, "good pick");
        assert_eq!(input.suggestions.strategy.as_deref(), Some("diachronic"));
    }
}
