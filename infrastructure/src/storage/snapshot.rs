//! JSON snapshot of the in-memory store.
//!
//! The CLI loads the snapshot on start and writes it back after each
//! command, so state survives between invocations. Writes go to a sibling
//! temp file first and are renamed into place.

use semantra_domain::{
    Agent, ConsensusRun, Decision, DecisionOverride, ExperimentRun, Feedback, LearningPattern,
    ToolExecution,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot {path} is not valid: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("Snapshot {path} has unsupported version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },
}

/// Every table of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub executions: Vec<ToolExecution>,
    #[serde(default)]
    pub feedback: Vec<Feedback>,
    #[serde(default)]
    pub overrides: Vec<DecisionOverride>,
    #[serde(default)]
    pub patterns: Vec<LearningPattern>,
    #[serde(default)]
    pub consensus: Vec<ConsensusRun>,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub experiments: Vec<ExperimentRun>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            decisions: Vec::new(),
            executions: Vec::new(),
            feedback: Vec::new(),
            overrides: Vec::new(),
            patterns: Vec::new(),
            consensus: Vec::new(),
            agents: Vec::new(),
            experiments: Vec::new(),
        }
    }
}

/// Snapshot file on disk.
#[derive(Debug, Clone)]
pub struct JsonSnapshot {
    path: PathBuf,
}

impl JsonSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot; `None` when the file does not exist yet.
    pub fn load(&self) -> Result<Option<StoreSnapshot>, SnapshotError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let snapshot: StoreSnapshot =
            serde_json::from_str(&content).map_err(|e| SnapshotError::Invalid {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                path: self.path.clone(),
                version: snapshot.version,
            });
        }
        debug!(
            "Loaded snapshot {} ({} decision(s), {} pattern(s))",
            self.path.display(),
            snapshot.decisions.len(),
            snapshot.patterns.len()
        );
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<(), SnapshotError> {
        let io = |source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let content = serde_json::to_string_pretty(snapshot).map_err(|e| SnapshotError::Invalid {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(io)?;
        std::fs::rename(&tmp, &self.path).map_err(io)?;
        debug!("Saved snapshot {}", self.path.display());
        Ok(())
    }
}
