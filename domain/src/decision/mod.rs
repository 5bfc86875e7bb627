//! Decision domain
//!
//! A decision is one orchestration attempt: which tools to run on a document,
//! with which embedding model and strategy, and how confident the engine is.
//! Tool executions are owned by their decision.

pub mod entities;
pub mod factors;
pub mod parsing;
pub mod tool_execution;
pub mod value_objects;

pub use entities::{Decision, DecisionDraft, DecisionStatus};
pub use factors::{ConfidenceSource, ConsensusSummary, DecisionFactors, FactorScore, PatternMerge};
pub use parsing::parse_strategy_proposal;
pub use tool_execution::{ExecutionStatus, ToolExecution, ToolExecutionState, mean_quality};
pub use value_objects::{
    ComplexityLevel, DocumentCharacteristics, Era, StrategyProposal, TemporalSpan, TermContext,
    ToolDescriptor, ToolRegistry,
};
