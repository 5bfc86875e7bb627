//! LLM provider configuration from TOML (`[llm]` section)

use serde::{Deserialize, Serialize};

/// Which gateway the CLI builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Local Ollama server (requires the `ollama` feature)
    #[default]
    Ollama,
    /// No LLM; proposals fail and only re-executions work
    None,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "ollama",
            LlmProvider::None => "none",
        }
    }
}

/// # Example
///
/// ```toml
/// [llm]
/// provider = "ollama"
/// endpoint = "http://localhost:11434"
/// timeout_secs = 120
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLlmConfig {
    pub provider: LlmProvider,
    pub endpoint: String,
    /// Timeout of one HTTP request to the provider
    pub timeout_secs: u64,
}

impl Default for FileLlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            endpoint: "http://localhost:11434".to_string(),
            timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_deserialize() {
        let config: FileLlmConfig = toml::from_str("provider = \"none\"").unwrap();
        assert_eq!(config.provider, LlmProvider::None);
        assert_eq!(config.endpoint, "http://localhost:11434");
    }
}
