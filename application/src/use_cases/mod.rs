//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod agent_registry;
pub mod consensus;
pub mod feedback;
pub mod orchestrator;
pub mod overrides;
pub mod pattern_learner;
pub mod provenance;
pub mod run_experiment;
pub mod shared;
pub mod tool_tracker;
