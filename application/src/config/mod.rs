//! Application-level configuration.
//!
//! - [`ExecutionParams`] — retries, deadlines, worker pool
//! - [`EngineConfig`] — container of every slice the engine needs

pub mod engine_config;
pub mod execution_params;

pub use engine_config::{EngineConfig, ModelSelection};
pub use execution_params::ExecutionParams;
