//! MCP tool wrapper: adapts MCP server tools to the Steward `Tool` trait.

use async_trait::async_trait;
use std::sync::Arc;

use super::client::McpClient;
use crate::tools::{Tool, ToolCategory, ToolContext, ToolOutput};

/// Wraps a single MCP tool as a Steward `Tool` implementation.
pub struct McpToolWrapper {
    /// Tool name as exposed to the agent (prefixed with server name).
    tool_name: String,
    /// Tool description.
    description: String,
    /// JSON schema for input parameters.
    input_schema: serde_json::Value,
    /// The original tool name on the MCP server (without prefix).
    remote_name: String,
    /// Shared reference to the MCP client.
    client: Arc<McpClient>,
}

impl McpToolWrapper {
    /// Create a new wrapper for an MCP tool.
    ///
    /// Tool names are prefixed with the server name: `{server}_{tool}`.
    pub fn new(
        server_name: &str,
        remote_name: &str,
        description: &str,
        input_schema: serde_json::Value,
        client: Arc<McpClient>,
    ) -> Self {
        Self {
            tool_name: format!("{}_{}", server_name, remote_name),
            description: description.to_string(),
            input_schema,
            remote_name: remote_name.to_string(),
            client,
        }
    }

    /// Get the remote (unprefixed) tool name.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }
}

#[async_trait]
impl Tool for McpToolWrapper {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    // Remote side effects are unknown, so every call is gated.
    fn category(&self) -> ToolCategory {
        ToolCategory::NetworkWrite
    }

    fn parameters(&self) -> serde_json::Value {
        self.input_schema.clone()
    }

    fn describe_action(&self, args: &serde_json::Value) -> String {
        format!(
            "Call '{}' on MCP server '{}' with {}",
            self.remote_name,
            self.client.name(),
            args
        )
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        _ctx: &ToolContext,
    ) -> crate::error::Result<ToolOutput> {
        let result = self.client.call_tool(&self.remote_name, args).await?;

        let text: String = result
            .content
            .iter()
            .filter_map(|block| block.as_text())
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error {
            Ok(ToolOutput::error(if text.is_empty() {
                "MCP tool returned error".to_string()
            } else {
                text
            }))
        } else {
            Ok(ToolOutput::success(if text.is_empty() {
                "(no output)".to_string()
            } else {
                text
            }))
        }
    }
}
