//! Tool configuration from TOML (`[tools.<name>]` sections)
//!
//! Every section registers one NLP tool the orchestrator may select and
//! tells the command invoker how to run it.
//!
//! ```toml
//! [tools.collocations]
//! command = "drift-collocations --doc {document} --term {term}"
//! description = "Collocation shifts across time slices"
//! domains = ["literature", "history"]
//! independent = true
//! expected_runtime_ms = 4000
//! default_quality = 0.7
//! ```

use semantra_domain::{ConfigIssue, ConfigIssueCode, ToolDescriptor, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quality assumed for tools that print plain text
pub const DEFAULT_TOOL_QUALITY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileToolConfig {
    /// Shell command template with `{document}`, `{term}` and `{params}`
    pub command: Option<String>,
    pub description: String,
    /// Domains the tool suits; empty means any
    pub domains: Vec<String>,
    /// Does not consume earlier tools' output and may run in parallel
    pub independent: bool,
    pub expected_runtime_ms: u64,
    /// Quality reported when the tool's stdout is not structured
    pub default_quality: f64,
}

impl Default for FileToolConfig {
    fn default() -> Self {
        Self {
            command: None,
            description: String::new(),
            domains: Vec::new(),
            independent: false,
            expected_runtime_ms: 0,
            default_quality: DEFAULT_TOOL_QUALITY,
        }
    }
}

impl FileToolConfig {
    pub fn to_descriptor(&self, name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: self.description.clone(),
            domains: self.domains.clone(),
            independent: self.independent,
            expected_runtime_ms: self.expected_runtime_ms,
        }
    }
}

/// Registry of every configured tool, in name order.
pub fn tool_registry(tools: &BTreeMap<String, FileToolConfig>) -> ToolRegistry {
    tools
        .iter()
        .fold(ToolRegistry::new(), |registry, (name, config)| {
            registry.register(config.to_descriptor(name))
        })
}

pub(super) fn validate_tools(tools: &BTreeMap<String, FileToolConfig>) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    if tools.is_empty() {
        issues.push(ConfigIssue::warning(
            ConfigIssueCode::NoToolsConfigured,
            "no [tools.<name>] sections; every proposal will be rejected",
        ));
    }
    for (name, tool) in tools {
        if tool.command.as_deref().is_none_or(|c| c.trim().is_empty()) {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::ToolWithoutCommand,
                format!("tools.{}: no command; executions of this tool will fail", name),
            ));
        }
        if !(0.0..=1.0).contains(&tool.default_quality) {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ValueOutOfRange,
                format!(
                    "tools.{}.default_quality: {} is outside [0, 1]",
                    name, tool.default_quality
                ),
            ));
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_keeps_descriptor_fields() {
        let mut tools = BTreeMap::new();
        tools.insert(
            "collocations".to_string(),
            FileToolConfig {
                command: Some("true".into()),
                domains: vec!["literature".into()],
                independent: true,
                expected_runtime_ms: 4000,
                ..Default::default()
            },
        );
        let registry = tool_registry(&tools);
        let tool = registry.get("collocations").unwrap();
        assert!(tool.independent);
        assert_eq!(tool.domains, vec!["literature"]);
        assert_eq!(registry.expected_runtime_ms(&["collocations".to_string()]), 4000);
    }

    #[test]
    fn test_tool_without_command_warns() {
        let mut tools = BTreeMap::new();
        tools.insert("A".to_string(), FileToolConfig::default());
        let issues = validate_tools(&tools);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, ConfigIssueCode::ToolWithoutCommand);
    }
}
