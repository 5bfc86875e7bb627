//! Presentation layer for semantra
//!
//! This crate contains CLI definitions, output formatters
//! and progress reporters.

pub mod cli;
pub mod config;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use cli::commands::{
    AgentsCommand, Cli, Commands, DecisionsArgs, FeedbackCommand, OutputFormat, OverrideArgs,
    ProposeArgs, RunArgs, SubmitFeedbackArgs,
};
pub use config::OutputConfig;
pub use output::console::ConsoleFormatter;
pub use progress::reporter::{ProgressReporter, SimpleProgress};
