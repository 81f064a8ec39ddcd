//! Tools module - Tool definitions and execution for LLM function calling
//!
//! This module provides the infrastructure for defining and executing tools
//! that the model can request during a turn.
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `ToolContext`: Execution context (session, workspace, cancellation, depth)
//! - `ToolRegistry`: Tools by name, plus the definitions sent to the provider
//! - `ToolDispatcher`: Runs one call through validation, permission and execution
//! - `PermissionGate`: Authorizes sensitive tools
//!
//! # Built-in Tools
//!
//! - `EchoTool`: Simple echo tool for testing
//! - `ReadFileTool`, `WriteFileTool`, `EditFileTool`, `DeleteFileTool`, `ListDirTool`
//! - `ShellTool`: Execute shell commands
//! - `DelegateTool`: Run a nested agent turn
//! - `McpToolWrapper`: A tool served by a remote MCP server
//!
//! # Example
//!
//! ```rust
//! use steward::tools::{EchoTool, ToolRegistry};
//! use steward::tools::shell::ShellTool;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Box::new(EchoTool));
//! registry.register(Box::new(ShellTool::new()));
//!
//! assert!(registry.has("echo"));
//! assert!(registry.lookup("shell").unwrap().sensitive);
//! assert_eq!(registry.definitions().len(), 2);
//! ```

pub mod delegate;
pub mod dispatch;
pub mod filesystem;
pub mod mcp;
pub mod permission;
mod registry;
pub mod schema;
pub mod shell;
mod types;

pub use delegate::DelegateTool;
pub use dispatch::ToolDispatcher;
pub use filesystem::{DeleteFileTool, EditFileTool, ListDirTool, ReadFileTool, WriteFileTool};
pub use mcp::{register_mcp_tools, McpToolWrapper};
pub use permission::{
    AllowAllGate, DenyAllGate, PermissionDecision, PermissionGate, PermissionRequest,
    ScriptedGate, SessionPermissions,
};
pub use registry::{ToolInfo, ToolRegistry};
pub use shell::ShellTool;
pub use types::{Tool, ToolCategory, ToolContext, ToolOutput};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::error::Result;

/// A simple echo tool for testing purposes.
///
/// This tool echoes back any message provided to it.
///
/// # Example
///
/// ```rust
/// use steward::tools::{Tool, ToolContext, EchoTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let tool = EchoTool;
/// let ctx = ToolContext::new();
/// let result = tool.execute(json!({"message": "Hello"}), &ctx).await;
/// assert_eq!(result.unwrap().content, "Hello");
/// # });
/// ```
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo"
                }
            },
            "required": ["message"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FilesystemRead
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");
        Ok(ToolOutput::success(message))
    }
}

/// Register the built-in tools. `delegate` is included only when delegation
/// is enabled in `config`.
pub fn register_builtin_tools(registry: &mut ToolRegistry, config: &Config) {
    registry.register(Box::new(EchoTool));
    registry.register(Box::new(ReadFileTool));
    registry.register(Box::new(WriteFileTool));
    registry.register(Box::new(EditFileTool));
    registry.register(Box::new(DeleteFileTool));
    registry.register(Box::new(ListDirTool));
    registry.register(Box::new(ShellTool::new()));
    if config.delegate.enabled {
        registry.register(Box::new(DelegateTool::new(config.delegate.max_depth)));
    }
}
