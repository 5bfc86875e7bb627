//! Prompt domain
//!
//! Templates for the strategy proposal conversation.

mod template;

pub use template::PromptTemplate;
