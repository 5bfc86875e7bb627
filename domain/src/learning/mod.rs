//! Pattern learning domain
//!
//! Feedback and applied overrides are reduced to [`PatternSeed`]s and folded
//! into [`LearningPattern`]s keyed by a [`ContextSignature`]. The orchestrator
//! later merges the best live pattern into new proposals.

pub mod pattern;
pub mod policy;
pub mod signature;

pub use pattern::{
    LearningPattern, PatternConditions, PatternRecommendation, PatternSeed, PatternStatus,
    SeedSource, StatusChange, select_best,
};
pub use policy::{LearningPolicy, SuccessRatePolicy};
pub use signature::{ConfidenceBand, ContextSignature};
