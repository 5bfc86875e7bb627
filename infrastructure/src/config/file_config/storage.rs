//! Storage locations from TOML (`[storage]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Relative paths resolve against the working directory.
///
/// # Example
///
/// ```toml
/// [storage]
/// snapshot = ".semantra/state.json"
/// provenance_log = ".semantra/provenance.jsonl"
/// documents = "documents.toml"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStorageConfig {
    /// JSON snapshot of every table
    pub snapshot: PathBuf,
    /// Append-only provenance ledger
    pub provenance_log: PathBuf,
    /// Document manifest read by the document service
    pub documents: PathBuf,
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from(".semantra/state.json"),
            provenance_log: PathBuf::from(".semantra/provenance.jsonl"),
            documents: PathBuf::from("documents.toml"),
        }
    }
}
