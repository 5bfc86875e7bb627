//! Consensus domain
//!
//! Several models propose a strategy for the same decision; their proposals
//! are compared pairwise and reconciled into one verdict. Consensus holds
//! only when every pair agrees at least as much as the threshold.

pub mod agreement;
pub mod run;

pub use agreement::{
    AgreementMatrix, ConsensusPolicy, agreement, consensus_reached, jaccard, strategy_similarity,
};
pub use run::{ConsensusRun, ConsensusVerdict, DisagreementArea, ModelResponse, reconcile};
