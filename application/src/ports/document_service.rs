//! Document service port
//!
//! Ingestion and text extraction live outside the engine; it only asks for
//! the characteristics of a document it is about to orchestrate.

use async_trait::async_trait;
use semantra_domain::{DocumentCharacteristics, DocumentId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn characteristics(&self, id: &DocumentId)
    -> Result<DocumentCharacteristics, DocumentError>;

    /// Every document the service knows about.
    async fn list(&self) -> Result<Vec<DocumentId>, DocumentError>;
}
