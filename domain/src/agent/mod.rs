//! Agent registry domain: typed actors referenced as originators.

pub mod entities;

pub use entities::{Agent, AgentKind};
