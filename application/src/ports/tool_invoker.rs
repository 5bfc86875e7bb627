//! Tool invoker port
//!
//! Defines how the engine runs one NLP tool on a document. The tools
//! themselves are external programs or services.

use async_trait::async_trait;
use semantra_domain::DocumentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolInvocationError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool failed: {0}")]
    Failed(String),

    #[error("Tool output could not be read: {0}")]
    InvalidOutput(String),

    #[error("Timeout")]
    Timeout,
}

/// What a tool is asked to do.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub tool: String,
    pub document_id: DocumentId,
    pub term: String,
    /// Free-form parameters passed through to the tool.
    pub params: serde_json::Value,
}

/// What a tool reported back.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub summary: String,
    /// Raw quality as reported; validated by the tracker.
    pub quality: f64,
}

#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput, ToolInvocationError>;
}
