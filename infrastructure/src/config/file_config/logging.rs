//! Logging configuration from TOML (`[logging]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// # Example
///
/// ```toml
/// [logging]
/// file = ".semantra/logs/semantra.log"   # rotated daily
/// level = "info"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// Also write logs to this file (daily rolling)
    pub file: Option<PathBuf>,
    /// Filter used when neither `-v` nor `RUST_LOG` is given
    pub level: Option<String>,
}
