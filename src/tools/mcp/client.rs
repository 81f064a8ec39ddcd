//! Minimal MCP client speaking JSON-RPC 2.0 over HTTP.
//!
//! Only the tool surface is implemented: `initialize`, `tools/list` and
//! `tools/call`. The handshake runs lazily before the first real request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Result, StewardError};

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({"type": "object"})
}

#[derive(Debug, Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<McpTool>,
}

/// One content block of a tool result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    #[serde(other)]
    Other,
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

/// Client for a single MCP server.
pub struct McpClient {
    name: String,
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
    initialized: OnceCell<()>,
}

impl McpClient {
    /// Create a client. No request is made until the first call.
    pub fn new(name: &str, url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
            next_id: AtomicU64::new(1),
            initialized: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, request: &JsonRpcRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| StewardError::Mcp(format!("{}: {} failed: {}", self.name, request.method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StewardError::Mcp(format!(
                "{}: {} returned HTTP {}",
                self.name, request.method, status
            )));
        }
        Ok(response)
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        };
        debug!(server = %self.name, method, id, "MCP request");

        let response: JsonRpcResponse = self
            .post(&request)
            .await?
            .json()
            .await
            .map_err(|e| StewardError::Mcp(format!("{}: invalid {} response: {}", self.name, method, e)))?;

        if let Some(err) = response.error {
            return Err(StewardError::Mcp(format!(
                "{}: {} error {}: {}",
                self.name, method, err.code, err.message
            )));
        }
        response
            .result
            .ok_or_else(|| StewardError::Mcp(format!("{}: {} returned no result", self.name, method)))
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params: json!({}),
        };
        self.post(&request).await.map(|_| ())
    }

    /// Perform the `initialize` handshake once.
    pub async fn initialize(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                self.rpc(
                    "initialize",
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {},
                        "clientInfo": {
                            "name": env!("CARGO_PKG_NAME"),
                            "version": env!("CARGO_PKG_VERSION")
                        }
                    }),
                )
                .await?;
                self.notify("notifications/initialized").await
            })
            .await
            .map(|_| ())
    }

    /// List the server's tools.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        self.initialize().await?;
        let result = self.rpc("tools/list", json!({})).await?;
        let list: ToolsListResult = serde_json::from_value(result)?;
        Ok(list.tools)
    }

    /// Invoke a tool by its server-side name.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.initialize().await?;
        let result = self
            .rpc("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish()
    }
}
