//! Command tool invoker: configured NLP tools as shell commands.
//!
//! Each tool in `[tools.<name>]` wraps a command template with `{document}`,
//! `{term}` and `{params}` placeholders. Values are shell-escaped before
//! substitution (single-quote wrapping on Unix, double quotes on Windows).
//!
//! stdout is read as `{"summary": "...", "quality": 0.8}`; anything else is
//! taken verbatim as the summary with the tool's default quality. A non-zero
//! exit status fails the invocation.
//!
//! ```toml
//! [tools.collocations]
//! command = "python -m drift.collocations --doc {document} --term {term}"
//! domains = ["literature"]
//! default_quality = 0.7
//! ```

use crate::config::FileToolConfig;
use async_trait::async_trait;
use semantra_application::{ToolInvocationError, ToolInvoker, ToolOutput, ToolRequest};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Maximum stderr kept in an error message
const MAX_STDERR_CHARS: usize = 2000;

/// One runnable tool.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTool {
    /// Command template with `{document}`, `{term}` and `{params}` placeholders
    pub template: String,
    /// Quality reported when stdout is not structured
    pub default_quality: f64,
}

/// Structured tool output.
#[derive(Debug, Deserialize)]
struct ReportedOutput {
    summary: String,
    quality: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CommandToolInvoker {
    tools: HashMap<String, CommandTool>,
    working_dir: Option<String>,
}

impl CommandToolInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tools with a command from `[tools.<name>]`; the rest are skipped.
    pub fn from_config(configs: &BTreeMap<String, FileToolConfig>) -> Self {
        let tools = configs
            .iter()
            .filter_map(|(name, config)| {
                let template = config.command.as_ref()?.clone();
                Some((
                    name.clone(),
                    CommandTool {
                        template,
                        default_quality: config.default_quality,
                    },
                ))
            })
            .collect();
        Self {
            tools,
            working_dir: None,
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>, tool: CommandTool) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Substitute the request into a template.
    fn build_command(template: &str, request: &ToolRequest) -> String {
        let params = match &request.params {
            serde_json::Value::Null => "{}".to_string(),
            other => other.to_string(),
        };
        template
            .replace("{document}", &shell_escape(request.document_id.as_str()))
            .replace("{term}", &shell_escape(&request.term))
            .replace("{params}", &shell_escape(&params))
    }
}

/// Read stdout as structured output, or verbatim with `default_quality`.
fn parse_output(stdout: &str, default_quality: f64) -> Result<ToolOutput, ToolInvocationError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(ToolInvocationError::InvalidOutput(
            "tool produced no output".to_string(),
        ));
    }
    Ok(match serde_json::from_str::<ReportedOutput>(trimmed) {
        Ok(reported) => ToolOutput {
            summary: reported.summary,
            quality: reported.quality,
        },
        Err(_) => ToolOutput {
            summary: trimmed.to_string(),
            quality: default_quality,
        },
    })
}

#[async_trait]
impl ToolInvoker for CommandToolInvoker {
    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput, ToolInvocationError> {
        let tool = self
            .tools
            .get(&request.tool)
            .ok_or_else(|| ToolInvocationError::NotFound(request.tool.clone()))?;
        let command_str = Self::build_command(&tool.template, request);
        debug!("Running tool {}: {}", request.tool, command_str);

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", &command_str]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", &command_str]);
            c
        };
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        // The tracker drops this future on timeout; take the child down with it
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            ToolInvocationError::Failed(format!("failed to start `{}`: {}", command_str, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(ToolInvocationError::Failed(if stderr.is_empty() {
                format!("exit status {}", code)
            } else {
                format!("exit status {}: {}", code, stderr)
            }));
        }

        parse_output(&String::from_utf8_lossy(&output.stdout), tool.default_quality)
    }
}

/// Escape a string for safe shell substitution.
fn shell_escape(s: &str) -> String {
    if cfg!(target_os = "windows") {
        shell_escape_windows(s)
    } else {
        shell_escape_unix(s)
    }
}

/// Unix shell escape: wrap in single quotes, escape internal single quotes.
fn shell_escape_unix(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 4);
    escaped.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            escaped.push_str("'\\''");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}

/// Windows cmd.exe escape: wrap in double quotes, escape `"`, `%`, and `!`.
fn shell_escape_windows(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 4);
    escaped.push('"');
    for ch in s.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '%' => escaped.push_str("%%"),
            '!' => escaped.push_str("^!"),
            _ => escaped.push(ch),
        }
    }
    escaped.push('"');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(tool: &str, term: &str) -> ToolRequest {
        ToolRequest {
            tool: tool.to_string(),
            document_id: "doc-1".into(),
            term: term.to_string(),
            params: json!({"window": 5}),
        }
    }

    fn tool(template: &str) -> CommandTool {
        CommandTool {
            template: template.to_string(),
            default_quality: 0.5,
        }
    }

    #[test]
    fn test_shell_escape_unix() {
        assert_eq!(shell_escape_unix("hello"), "'hello'");
        assert_eq!(shell_escape_unix("it's"), "'it'\\''s'");
        assert_eq!(shell_escape_unix("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn test_shell_escape_windows() {
        assert_eq!(shell_escape_windows("hello world"), "\"hello world\"");
        assert_eq!(shell_escape_windows("100%"), "\"100%%\"");
    }

    #[cfg(unix)]
    #[test]
    fn test_build_command_escapes_placeholders() {
        let cmd = CommandToolInvoker::build_command(
            "drift --doc {document} --term {term} --params {params}",
            &request("A", "king's"),
        );
        assert_eq!(
            cmd,
            "drift --doc 'doc-1' --term 'king'\\''s' --params '{\"window\":5}'"
        );
    }

    #[test]
    fn test_parse_structured_output() {
        let out = parse_output(r#"{"summary": "42 collocations", "quality": 0.8}"#, 0.5).unwrap();
        assert_eq!(out.summary, "42 collocations");
        assert_eq!(out.quality, 0.8);
    }

    #[test]
    fn test_parse_verbatim_output() {
        let out = parse_output("plain text report\n", 0.6).unwrap();
        assert_eq!(out.summary, "plain text report");
        assert_eq!(out.quality, 0.6);

        // JSON without the expected fields is still a verbatim summary
        let out = parse_output(r#"{"rows": 3}"#, 0.6).unwrap();
        assert_eq!(out.summary, r#"{"rows": 3}"#);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(matches!(
            parse_output("  \n", 0.5),
            Err(ToolInvocationError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let invoker = CommandToolInvoker::new();
        let err = invoker.invoke(&request("missing", "x")).await.unwrap_err();
        assert!(matches!(err, ToolInvocationError::NotFound(name) if name == "missing"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_reads_stdout() {
        let invoker = CommandToolInvoker::new()
            .with_tool("echo", tool(r#"printf '{"summary":"%s","quality":0.9}' {term}"#));
        let out = invoker.invoke(&request("echo", "broadcast")).await.unwrap();
        assert_eq!(out.summary, "broadcast");
        assert_eq!(out.quality, 0.9);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let invoker =
            CommandToolInvoker::new().with_tool("broken", tool("echo 'no model' >&2; exit 3"));
        let err = invoker.invoke(&request("broken", "x")).await.unwrap_err();
        match err {
            ToolInvocationError::Failed(message) => {
                assert!(message.contains("exit status 3"));
                assert!(message.contains("no model"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_config_skips_tools_without_command() {
        let mut configs = BTreeMap::new();
        configs.insert(
            "A".to_string(),
            FileToolConfig {
                command: Some("echo a".into()),
                ..Default::default()
            },
        );
        configs.insert("B".to_string(), FileToolConfig::default());
        let invoker = CommandToolInvoker::from_config(&configs);
        assert_eq!(invoker.len(), 1);
    }
}
