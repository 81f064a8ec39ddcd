//! MCP bridge: remote tool servers exposed as ordinary tools.
//!
//! Each configured server is queried with `tools/list`; every advertised tool
//! is registered as an [`McpToolWrapper`] named `{server}_{tool}`. From the
//! agent loop's point of view these are just more `Tool` implementations.

pub mod client;
pub mod wrapper;

pub use client::{CallToolResult, ContentBlock, McpClient, McpTool};
pub use wrapper::McpToolWrapper;

use std::sync::Arc;

use tracing::warn;

use crate::config::McpServerConfig;

use super::ToolRegistry;

/// Discover tools on every server and register them.
///
/// A server that cannot be reached is skipped with a warning. Returns the
/// names of the registered tools.
pub async fn register_mcp_tools(
    registry: &mut ToolRegistry,
    servers: &[McpServerConfig],
) -> Vec<String> {
    let mut registered = Vec::new();

    for server in servers {
        let client = Arc::new(McpClient::new(&server.name, &server.url, server.timeout_secs));
        let tools = match client.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server = %server.name, url = %server.url, error = %e, "Skipping MCP server");
                continue;
            }
        };

        crate::log_component!(
            info,
            "mcp",
            "Discovered MCP tools",
            server = server.name.as_str(),
            count = tools.len()
        );
        for tool in tools {
            let wrapper = McpToolWrapper::new(
                &server.name,
                &tool.name,
                tool.description.as_deref().unwrap_or_default(),
                tool.input_schema,
                Arc::clone(&client),
            );
            registered.push(format!("{}_{}", server.name, tool.name));
            registry.register(Box::new(wrapper));
        }
    }

    registered
}
