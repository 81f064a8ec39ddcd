//! Shell tool for Steward
//!
//! This module provides a tool for executing shell commands. Commands are run
//! with `sh -c` in the workspace directory. The child is spawned with
//! `kill_on_drop`, so when the dispatcher abandons the call on cancellation
//! the process is killed rather than left running.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, StewardError};
use crate::security::ShellSecurityConfig;

use super::{Tool, ToolCategory, ToolContext, ToolOutput};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Tool for executing shell commands.
///
/// Returns stdout, followed by stderr when present. A non-zero exit status
/// produces an error result carrying the exit code.
///
/// # Parameters
/// - `command`: The shell command to execute (required)
/// - `timeout`: Timeout in seconds, defaults to 60 (optional)
///
/// # Security
/// Commands are validated against a blocklist ([`ShellSecurityConfig`]) before
/// anything is spawned. Use `ShellTool::permissive()` to disable the check in
/// trusted environments.
///
/// # Example
/// ```rust
/// use steward::tools::{Tool, ToolContext};
/// use steward::tools::shell::ShellTool;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let tool = ShellTool::new();
/// let ctx = ToolContext::new();
/// let result = tool.execute(json!({"command": "echo hello"}), &ctx).await;
/// assert_eq!(result.unwrap().content.trim(), "hello");
/// # });
/// ```
pub struct ShellTool {
    security_config: ShellSecurityConfig,
}

impl ShellTool {
    /// Create a new shell tool with default security settings.
    pub fn new() -> Self {
        Self {
            security_config: ShellSecurityConfig::new(),
        }
    }

    /// Create a shell tool with custom security configuration.
    pub fn with_security(security_config: ShellSecurityConfig) -> Self {
        Self { security_config }
    }

    /// Create a shell tool with no security restrictions.
    ///
    /// # Warning
    /// Only use in trusted environments where command injection is not a concern.
    pub fn permissive() -> Self {
        Self {
            security_config: ShellSecurityConfig::permissive(),
        }
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

fn format_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => format!("--- stderr ---\n{}", stderr),
        (false, false) => format!("{}\n--- stderr ---\n{}", stdout.trim_end(), stderr),
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return the output"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 60)"
                }
            },
            "required": ["command"]
        })
    }

    fn describe_action(&self, args: &Value) -> String {
        let command = args.get("command").and_then(Value::as_str).unwrap_or("?");
        format!("Run `{}`", command)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StewardError::Tool("Missing 'command' argument".into()))?;

        self.security_config.validate_command(command)?;

        let timeout_secs = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref workspace) = ctx.workspace {
            cmd.current_dir(workspace);
        }

        debug!(command = %command, timeout_secs, "Spawning shell command");
        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
            .await
            .map_err(|_| {
                StewardError::Tool(format!("Command timed out after {}s", timeout_secs))
            })?
            .map_err(|e| StewardError::Tool(format!("Failed to run command: {}", e)))?;

        let text = format_output(&output.stdout, &output.stderr);
        if output.status.success() {
            Ok(ToolOutput::success(text))
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            Ok(ToolOutput::error(format!("{}\n[exit code: {}]", text.trim_end(), code)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_shell_echo() {
        let tool = ShellTool::new();
        let result = tool
            .execute(json!({"command": "echo hello"}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(result.content.trim(), "hello");
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_shell_multiple_commands() {
        let tool = ShellTool::new();
        let result = tool
            .execute(
                json!({"command": "echo first && echo second"}),
                &ToolContext::new(),
            )
            .await
            .unwrap();
        assert!(result.content.contains("first"));
        assert!(result.content.contains("second"));
    }

    #[tokio::test]
    async fn test_shell_runs_in_workspace() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let ctx = ToolContext::new().with_workspace(dir.path().to_str().unwrap());

        let result = ShellTool::new()
            .execute(json!({"command": "ls"}), &ctx)
            .await
            .unwrap();
        assert!(result.content.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit_is_error_output() {
        let result = ShellTool::new()
            .execute(json!({"command": "echo oops >&2; exit 3"}), &ToolContext::new())
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("oops"));
        assert!(result.content.ends_with("[exit code: 3]"));
    }

    #[tokio::test]
    async fn test_shell_timeout() {
        let err = ShellTool::new()
            .execute(json!({"command": "sleep 5", "timeout": 1}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_shell_blocked_command() {
        let err = ShellTool::new()
            .execute(json!({"command": "rm -rf /"}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StewardError::SecurityViolation(_)));
    }

    #[tokio::test]
    async fn test_shell_missing_command() {
        let err = ShellTool::new()
            .execute(json!({}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Missing 'command'"));
    }

    #[test]
    fn test_shell_is_sensitive() {
        let tool = ShellTool::new();
        assert!(tool.is_sensitive());
        assert_eq!(tool.describe_action(&json!({"command": "ls -la"})), "Run `ls -la`");
    }

    #[test]
    fn test_format_output() {
        assert_eq!(format_output(b"out\n", b""), "out\n");
        assert_eq!(format_output(b"", b"err\n"), "--- stderr ---\nerr\n");
        assert_eq!(format_output(b"out\n", b"err\n"), "out\n--- stderr ---\nerr\n");
    }
}
