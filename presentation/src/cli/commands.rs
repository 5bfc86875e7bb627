//! CLI command definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use semantra_domain::{
    AgentKind, AgreementLevel, ContextSignature, DecisionId, DecisionStatus, DocumentId,
    EmbeddingModel, ExperimentId, FeedbackId, FeedbackStatus, FeedbackType, OverridePayload,
    OverrideType, Suggestions, TermContext,
};
use std::path::PathBuf;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summaries
    Text,
    /// Pretty-printed JSON
    Json,
}

impl From<OutputFormat> for semantra_domain::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => semantra_domain::OutputFormat::Text,
            OutputFormat::Json => semantra_domain::OutputFormat::Json,
        }
    }
}

/// CLI arguments for semantra
#[derive(Parser, Debug)]
#[command(name = "semantra")]
#[command(author, version, about = "Decision engine for semantic drift experiments")]
#[command(long_about = r#"
Semantra decides which NLP tools, embedding model and strategy to use for each
document in a semantic drift experiment, runs the tools, and learns from the
feedback and overrides researchers give on its decisions.

Every decision, tool run, feedback, override and pattern is recorded with its
provenance.

Configuration files are loaded from (in priority order):
1. SEMANTRA_* environment variables (SEMANTRA_ENGINE__WORKER_POOL_SIZE=8)
2. --config <path>        Explicit config file
3. ./semantra.toml        Project-level config
4. ~/.config/semantra/config.toml   Global config

Example:
  semantra run --term broadcast --goal "track sense shift"
  semantra propose hansard-1850 --term broadcast --goal "sense shift"
  semantra feedback submit dec-1234 --researcher agt-5678 --type correction \
      --agreement disagree --confidence 0.4 --suggest-tool sense_clusters
  semantra override dec-1234 --researcher agt-5678 --type tool-selection \
      --tool collocations --justification "clusters are noisy on OCR text"
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format (overrides [output] format)
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an experiment over a set of documents
    Run(RunArgs),

    /// Propose (and by default execute) a strategy for one document
    Propose(ProposeArgs),

    /// Execute the tools of a proposed decision
    Execute {
        decision: DecisionId,
    },

    /// Submit, review and integrate researcher feedback
    #[command(subcommand)]
    Feedback(FeedbackCommand),

    /// Override a decision's selection and re-execute it
    Override(OverrideArgs),

    /// Mark a finished decision as validated
    Validate {
        decision: DecisionId,

        /// Measured runtime replacing the recorded one
        #[arg(long, value_name = "MS")]
        actual_runtime_ms: Option<u64>,
    },

    /// List learned patterns, best first
    Patterns {
        /// Only patterns covering `domain|complexity|era`
        #[arg(long)]
        signature: Option<ContextSignature>,
    },

    /// Register and list agents
    #[command(subcommand)]
    Agents(AgentsCommand),

    /// List decisions, or show one with its tool runs and lineage
    Decisions(DecisionsArgs),

    /// List experiment runs
    Experiments,
}

/// Term and its tracked variants
#[derive(Args, Debug, Clone)]
pub struct TermArgs {
    /// Term whose drift is studied
    #[arg(long)]
    pub term: String,

    /// Spelling variants tracked with the term (repeatable)
    #[arg(long = "variant", value_name = "VARIANT")]
    pub variants: Vec<String>,

    /// Research goal passed to the model
    #[arg(long)]
    pub goal: String,
}

impl TermArgs {
    pub fn term_context(&self) -> TermContext {
        TermContext::new(self.term.clone()).with_variants(self.variants.clone())
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub term: TermArgs,

    /// Documents to process (repeatable; every known document when omitted)
    #[arg(short, long = "document", value_name = "ID")]
    pub documents: Vec<DocumentId>,

    /// Experiment id (generated when omitted)
    #[arg(long)]
    pub id: Option<ExperimentId>,
}

#[derive(Args, Debug)]
pub struct ProposeArgs {
    pub document: DocumentId,

    #[command(flatten)]
    pub term: TermArgs,

    /// Stop after the proposal; run `semantra execute` later
    #[arg(long)]
    pub no_execute: bool,
}

#[derive(Subcommand, Debug)]
pub enum FeedbackCommand {
    /// Give feedback on a finished decision
    Submit(SubmitFeedbackArgs),

    /// Record a review outcome
    Review {
        feedback: FeedbackId,

        /// reviewed, rejected or obsolete
        #[arg(long, default_value = "reviewed")]
        outcome: FeedbackStatus,

        /// Reviewing agent (the engine when omitted)
        #[arg(long)]
        reviewer: Option<semantra_domain::AgentId>,
    },

    /// Integrate feedback and learn a pattern from it
    Integrate {
        feedback: FeedbackId,
    },

    /// List feedback
    List {
        #[arg(long)]
        status: Option<FeedbackStatus>,

        #[arg(long)]
        decision: Option<DecisionId>,
    },

    /// Decisions waiting for researcher review
    Pending,
}

#[derive(Args, Debug)]
pub struct SubmitFeedbackArgs {
    pub decision: DecisionId,

    #[arg(long)]
    pub researcher: semantra_domain::AgentId,

    /// correction, enhancement, validation or clarification
    #[arg(long = "type")]
    pub feedback_type: FeedbackType,

    /// strongly_disagree, disagree, neutral, agree or strongly_agree
    #[arg(long)]
    pub agreement: AgreementLevel,

    /// The researcher's own confidence in the decision, in [0, 1]
    #[arg(long)]
    pub confidence: f64,

    #[arg(long, default_value = "")]
    pub reasoning: String,

    /// Suggested tool (repeatable)
    #[arg(long = "suggest-tool", value_name = "TOOL")]
    pub suggest_tools: Vec<String>,

    #[arg(long, value_name = "MODEL")]
    pub suggest_embedding: Option<EmbeddingModel>,

    #[arg(long, value_name = "STRATEGY")]
    pub suggest_strategy: Option<String>,
}

impl SubmitFeedbackArgs {
    pub fn suggestions(&self) -> Suggestions {
        Suggestions {
            tools: self.suggest_tools.clone(),
            embedding_model: self.suggest_embedding.clone(),
            strategy: self.suggest_strategy.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct OverrideArgs {
    pub decision: DecisionId,

    #[arg(long)]
    pub researcher: semantra_domain::AgentId,

    /// full, tool_selection, embedding_model or strategy
    #[arg(long = "type")]
    pub override_type: OverrideType,

    /// Replacement tool (repeatable)
    #[arg(long = "tool", value_name = "TOOL")]
    pub tools: Vec<String>,

    #[arg(long, value_name = "MODEL")]
    pub embedding: Option<EmbeddingModel>,

    #[arg(long)]
    pub strategy: Option<String>,

    #[arg(long)]
    pub justification: String,
}

impl OverrideArgs {
    pub fn payload(&self) -> OverridePayload {
        OverridePayload {
            tools: self.tools.clone(),
            embedding_model: self.embedding.clone(),
            strategy: self.strategy.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum AgentsCommand {
    /// Register a researcher, program or organization
    Register {
        name: String,

        #[arg(long, value_enum, default_value = "person")]
        kind: AgentKindArg,

        /// Version of a software agent
        #[arg(long, default_value = "unknown")]
        agent_version: String,

        /// ORCID of a person
        #[arg(long)]
        orcid: Option<String>,
    },

    /// List registered agents
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgentKindArg {
    Person,
    Software,
    Organization,
}

impl AgentsCommand {
    /// Agent kind for a `register` command.
    pub fn agent_kind(&self) -> Option<AgentKind> {
        let AgentsCommand::Register {
            name,
            kind,
            agent_version,
            orcid,
        } = self
        else {
            return None;
        };
        Some(match kind {
            AgentKindArg::Person => AgentKind::Person {
                name: name.clone(),
                orcid: orcid.clone(),
            },
            AgentKindArg::Software => AgentKind::software(name.clone(), agent_version.clone()),
            AgentKindArg::Organization => AgentKind::organization(name.clone()),
        })
    }
}

#[derive(Args, Debug)]
pub struct DecisionsArgs {
    /// Show one decision in detail
    pub id: Option<DecisionId>,

    #[arg(long)]
    pub experiment: Option<ExperimentId>,

    #[arg(long)]
    pub status: Option<DecisionStatus>,

    /// Only decisions flagged for review
    #[arg(long)]
    pub needs_review: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("semantra").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_run_with_documents() {
        let cli = parse(&[
            "run", "--term", "broadcast", "--goal", "sense shift", "-d", "a", "-d", "b",
            "--variant", "brodcast",
        ]);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.documents, vec![DocumentId::new("a"), DocumentId::new("b")]);
        let term = args.term.term_context();
        assert_eq!(term.term, "broadcast");
        assert_eq!(term.variants, vec!["brodcast".to_string()]);
        assert!(args.id.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["patterns", "--output", "json", "-vv", "--no-config"]);
        assert_eq!(cli.output, Some(OutputFormat::Json));
        assert_eq!(cli.verbose, 2);
        assert!(cli.no_config);
        assert!(matches!(cli.command, Some(Commands::Patterns { signature: None })));
    }

    #[test]
    fn test_show_config_without_command() {
        let cli = parse(&["--show-config"]);
        assert!(cli.show_config);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_feedback_submit_parses_domain_values() {
        let cli = parse(&[
            "feedback",
            "submit",
            "dec-1",
            "--researcher",
            "agt-1",
            "--type",
            "correction",
            "--agreement",
            "disagree",
            "--confidence",
            "0.4",
            "--suggest-tool",
            "sense_clusters",
        ]);
        let Some(Commands::Feedback(FeedbackCommand::Submit(args))) = cli.command else {
            panic!("expected feedback submit");
        };
        assert_eq!(args.feedback_type, FeedbackType::Correction);
        assert_eq!(args.agreement, AgreementLevel::Disagree);
        assert_eq!(args.suggestions().tools, vec!["sense_clusters".to_string()]);
        assert!(args.suggestions().strategy.is_none());
    }

    #[test]
    fn test_feedback_rejects_unknown_type() {
        let result = Cli::try_parse_from([
            "semantra",
            "feedback",
            "submit",
            "dec-1",
            "--researcher",
            "agt-1",
            "--type",
            "praise",
            "--agreement",
            "agree",
            "--confidence",
            "0.9",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_override_payload() {
        let cli = parse(&[
            "override",
            "dec-1",
            "--researcher",
            "agt-1",
            "--type",
            "tool_selection",
            "--tool",
            "A",
            "--tool",
            "B",
            "--justification",
            "noisy",
        ]);
        let Some(Commands::Override(args)) = cli.command else {
            panic!("expected override");
        };
        assert_eq!(args.override_type, OverrideType::ToolSelection);
        assert_eq!(args.payload().tools, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_agents_register_kind() {
        let cli = parse(&["agents", "register", "Ada", "--orcid", "0000-0001"]);
        let Some(Commands::Agents(command)) = cli.command else {
            panic!("expected agents");
        };
        let kind = command.agent_kind().unwrap();
        assert!(kind.is_person());
        assert_eq!(kind.name(), "Ada");

        let cli = parse(&["agents", "list"]);
        let Some(Commands::Agents(command)) = cli.command else {
            panic!("expected agents");
        };
        assert!(command.agent_kind().is_none());
    }

    #[test]
    fn test_decisions_filters() {
        let cli = parse(&["decisions", "--status", "timeout", "--needs-review"]);
        let Some(Commands::Decisions(args)) = cli.command else {
            panic!("expected decisions");
        };
        assert_eq!(args.status, Some(DecisionStatus::Timeout));
        assert!(args.needs_review);
        assert!(args.id.is_none());
    }
}
