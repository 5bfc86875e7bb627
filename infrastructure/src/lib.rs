//! Infrastructure layer for semantra
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer, including configuration file loading.

pub mod config;
pub mod documents;
pub mod offline;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod provenance;
pub mod storage;
pub mod tools;

// Re-export commonly used types
pub use config::{
    ConfigError, ConfigLoader, ConfigSource, FileConfig, FileLlmConfig, FileLoggingConfig,
    FileOutputConfig, FileStorageConfig, FileToolConfig, LlmProvider,
};
pub use documents::{ManifestDocumentService, ManifestError};
#[cfg(feature = "ollama")]
pub use ollama::{OllamaError, OllamaLlmGateway};
pub use offline::OfflineLlmGateway;
pub use provenance::{InMemoryLedger, JsonlProvenanceLedger};
pub use storage::{JsonSnapshot, MemoryStore, SnapshotError, StoreSnapshot};
pub use tools::{CommandTool, CommandToolInvoker};
