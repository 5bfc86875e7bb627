//! Configuration file loading for semantra
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `SEMANTRA_` environment variables (`__` separates sections)
//! 2. `--config <path>` specified file
//! 3. Project root: `./semantra.toml` or `./.semantra.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/semantra/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    DEFAULT_TOOL_QUALITY, FileConfig, FileConsensusConfig, FileEngineConfig, FileLlmConfig,
    FileLoggingConfig, FileModelsConfig, FileOutputConfig, FileStorageConfig, FileToolConfig,
    LlmProvider, tool_registry,
};
pub use loader::{ConfigError, ConfigLoader, ConfigSource};
