//! Tool types for Steward
//!
//! This module defines the core types for tool execution, including the `Tool` trait
//! that all tools must implement, and the `ToolContext` struct that provides
//! execution context to tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentLoop;
use crate::error::Result;
use crate::history::FileHistory;

/// Coarse classification of what a tool touches.
///
/// The category decides the default for [`Tool::is_sensitive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Read-only filesystem operations (read, list).
    FilesystemRead,
    /// Write/modify filesystem operations (write, edit).
    FilesystemWrite,
    /// Read-only network operations.
    NetworkRead,
    /// Network operations that modify external state (remote tool servers).
    NetworkWrite,
    /// Shell command execution and process spawning.
    Shell,
    /// Destructive or high-risk operations (delete).
    Destructive,
    /// Runs another agent.
    Agent,
}

impl ToolCategory {
    /// Whether tools in this category require a permission decision.
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            ToolCategory::FilesystemWrite
                | ToolCategory::NetworkWrite
                | ToolCategory::Shell
                | ToolCategory::Destructive
        )
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FilesystemRead => write!(f, "filesystem_read"),
            Self::FilesystemWrite => write!(f, "filesystem_write"),
            Self::NetworkRead => write!(f, "network_read"),
            Self::NetworkWrite => write!(f, "network_write"),
            Self::Shell => write!(f, "shell"),
            Self::Destructive => write!(f, "destructive"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// Result of a tool execution, fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Content sent to the LLM as the tool result.
    pub content: String,
    /// Whether this result represents an error condition.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Error result. The model sees the message and may recover.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Trait that all tools must implement.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use steward::tools::{Tool, ToolCategory, ToolContext, ToolOutput};
/// use steward::error::Result;
///
/// struct MyTool;
///
/// #[async_trait]
/// impl Tool for MyTool {
///     fn name(&self) -> &str { "my_tool" }
///     fn description(&self) -> &str { "Does something useful" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({
///             "type": "object",
///             "properties": {},
///             "required": []
///         })
///     }
///     fn category(&self) -> ToolCategory { ToolCategory::FilesystemRead }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
///         Ok(ToolOutput::success("Done!"))
///     }
/// }
///
/// assert!(!MyTool.is_sensitive());
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name.
    ///
    /// This name is used to identify the tool when the LLM requests it.
    /// It should be unique within a registry.
    fn name(&self) -> &str;

    /// Get the tool description sent to the LLM.
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's parameters.
    ///
    /// Arguments are validated against this schema before `execute` runs.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given (already validated) arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput>;

    /// Tool category.
    ///
    /// Defaults to `ToolCategory::Shell` (fail-closed): a tool that forgets to
    /// override this is treated as sensitive.
    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }

    /// Whether execution must be authorized by the permission gate.
    fn is_sensitive(&self) -> bool {
        self.category().is_sensitive()
    }

    /// Human-readable description of what a call would do, shown by the
    /// permission gate.
    fn describe_action(&self, args: &Value) -> String {
        format!("{} {}", self.name(), args)
    }
}

/// Context provided to tools during execution.
#[derive(Clone, Default)]
pub struct ToolContext {
    /// Session the call belongs to
    pub session_id: String,
    /// The workspace directory for file operations
    pub workspace: Option<String>,
    /// Turn-scoped cancellation signal
    pub cancel: CancellationToken,
    /// Agent nesting depth (0 for the top-level loop)
    pub depth: usize,
    /// Receives before/after snapshots from file-mutating tools
    pub history: Option<Arc<dyn FileHistory>>,
    /// The running agent, for tools that start nested turns
    pub agent: Option<AgentLoop>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id)
            .field("workspace", &self.workspace)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("depth", &self.depth)
            .field("history", &self.history.is_some())
            .field("agent", &self.agent.is_some())
            .finish()
    }
}

impl ToolContext {
    /// Create a new empty tool context.
    ///
    /// # Example
    /// ```
    /// use steward::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new();
    /// assert!(ctx.workspace.is_none());
    /// assert_eq!(ctx.depth, 0);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = session_id.to_string();
        self
    }

    /// Set the workspace directory.
    ///
    /// # Example
    /// ```
    /// use steward::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new().with_workspace("/home/user/project");
    /// assert_eq!(ctx.workspace.as_deref(), Some("/home/user/project"));
    /// ```
    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn FileHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_agent(mut self, agent: AgentLoop) -> Self {
        self.agent = Some(agent);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistory;

    #[test]
    fn test_tool_context_builder_chain() {
        let ctx = ToolContext::new()
            .with_session("s1")
            .with_workspace("/tmp/workspace")
            .with_depth(2)
            .with_history(Arc::new(InMemoryHistory::new()));

        assert_eq!(ctx.session_id, "s1");
        assert_eq!(ctx.workspace.as_deref(), Some("/tmp/workspace"));
        assert_eq!(ctx.depth, 2);
        assert!(ctx.history.is_some());
        assert!(ctx.agent.is_none());
    }

    #[test]
    fn test_tool_context_debug() {
        let ctx = ToolContext::new().with_session("cli");
        let debug_str = format!("{:?}", ctx);
        assert!(debug_str.contains("ToolContext"));
        assert!(debug_str.contains("cli"));
    }

    #[test]
    fn test_tool_category_display() {
        assert_eq!(ToolCategory::FilesystemRead.to_string(), "filesystem_read");
        assert_eq!(ToolCategory::Shell.to_string(), "shell");
        assert_eq!(ToolCategory::Destructive.to_string(), "destructive");
    }

    #[test]
    fn test_tool_category_serde() {
        let json = serde_json::to_string(&ToolCategory::NetworkWrite).unwrap();
        assert_eq!(json, "\"network_write\"");
    }

    #[test]
    fn test_category_sensitivity() {
        assert!(!ToolCategory::FilesystemRead.is_sensitive());
        assert!(!ToolCategory::NetworkRead.is_sensitive());
        assert!(!ToolCategory::Agent.is_sensitive());
        assert!(ToolCategory::FilesystemWrite.is_sensitive());
        assert!(ToolCategory::Destructive.is_sensitive());
        assert!(ToolCategory::Shell.is_sensitive());
    }

    #[test]
    fn test_tool_default_category_is_fail_closed() {
        struct Bare;

        #[async_trait]
        impl Tool for Bare {
            fn name(&self) -> &str {
                "bare"
            }
            fn description(&self) -> &str {
                ""
            }
            fn parameters(&self) -> Value {
                serde_json::json!({"type": "object"})
            }
            async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
                Ok(ToolOutput::success(""))
            }
        }

        assert_eq!(Bare.category(), ToolCategory::Shell);
        assert!(Bare.is_sensitive());
        assert_eq!(
            Bare.describe_action(&serde_json::json!({"x": 1})),
            r#"bare {"x":1}"#
        );
    }

    #[test]
    fn test_tool_output_constructors() {
        let ok = ToolOutput::success("fine");
        assert!(!ok.is_error);
        let err = ToolOutput::error("something broke");
        assert!(err.is_error);
        assert_eq!(err.content, "something broke");
    }
}
