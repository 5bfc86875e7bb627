//! Core domain concepts shared across all subdomains.
//!
//! - [`model::Model`] / [`model::EmbeddingModel`] — LLMs and embedding models
//! - [`score::UnitScore`] — values constrained to `[0, 1]`
//! - [`ids`] — typed identifiers for every table
//! - [`error::DomainError`] — domain-level errors

pub mod error;
pub mod ids;
pub mod model;
pub mod score;
pub mod string;
