//! Claude (Anthropic) LLM provider implementation
//!
//! Implements [`LLMProvider`] over the Anthropic Messages API. Streaming uses
//! server-sent events; each frame is translated into [`ProviderEvent`]s as it
//! arrives.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use steward::providers::{ChatRequest, ClaudeProvider, LLMProvider};
//! use steward::session::Message;
//! use tokio_util::sync::CancellationToken;
//!
//! let provider = ClaudeProvider::new("your-api-key");
//! let request = ChatRequest::new(vec![Message::user("Hello!")]);
//! let mut events = provider.stream(request, CancellationToken::new());
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event);
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result, StewardError};

use super::convert::{wire_turns, WireTurn};
use super::error_classifier::classify_error_message;
use super::event::{FinishReason, ProviderEvent, ProviderFailure, ProviderStream, UsageReport};
use super::sse::{cancellable, sse_stream, within, FrameParser};
use super::{
    parse_provider_error, ChatRequest, LLMProvider, LLMResponse, LLMToolCall, Pricing,
    ToolDefinition, Usage,
};

/// The Claude API endpoint URL.
const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// The default Claude model to use.
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// The Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Claude/Anthropic LLM provider.
#[derive(Clone)]
pub struct ClaudeProvider {
    api_key: String,
    api_url: String,
    model: String,
    client: Client,
    supports_tools: bool,
    supports_streaming: bool,
    pricing: Pricing,
    idle_timeout: Duration,
}

impl std::fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("supports_tools", &self.supports_tools)
            .field("supports_streaming", &self.supports_streaming)
            .finish_non_exhaustive()
    }
}

impl ClaudeProvider {
    /// Create a new Claude provider with the given API key.
    ///
    /// # Example
    /// ```
    /// use steward::providers::{ClaudeProvider, LLMProvider};
    ///
    /// let provider = ClaudeProvider::new("sk-ant-api03-xxx");
    /// assert_eq!(provider.name(), "anthropic");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_url: CLAUDE_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            client: default_client(),
            supports_tools: true,
            supports_streaming: true,
            pricing: Pricing::default(),
            idle_timeout: Duration::from_secs(120),
        }
    }

    /// Build a provider from configuration. Fails without an API key.
    pub fn from_config(config: &ProviderConfig, default_model: &str) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StewardError::Config("Anthropic API key not configured".into()))?;

        let mut provider = Self::new(api_key);
        if let Some(base) = &config.api_base {
            provider.api_url = format!("{}/v1/messages", base.trim_end_matches('/'));
        }
        provider.model = config
            .model
            .clone()
            .unwrap_or_else(|| default_model.to_string());
        provider.supports_tools = config.supports_tools;
        provider.supports_streaming = config.supports_streaming;
        provider.pricing = Pricing {
            input_per_mtok: config.input_cost_per_mtok,
            output_per_mtok: config.output_cost_per_mtok,
        };
        provider.idle_timeout = Duration::from_secs(config.idle_timeout_secs.max(1));
        Ok(provider)
    }

    /// Replace the HTTP client (custom proxies, timeouts).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Override the full messages endpoint URL.
    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_string();
        self
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> ClaudeRequest {
        let (system, messages) = convert_messages(request);
        let tools = if self.supports_tools && !request.tools.is_empty() {
            Some(convert_tools(&request.tools))
        } else {
            None
        };

        ClaudeRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.model.clone()),
            max_tokens: request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system,
            tools,
            temperature: request.options.temperature,
            top_p: request.options.top_p,
            stop_sequences: request.options.stop.clone(),
            stream: if stream { Some(true) } else { None },
        }
    }

    fn post(&self, body: &ClaudeRequest) -> reqwest::RequestBuilder {
        self.client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }

    /// One non-streaming request.
    async fn send_complete(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<LLMResponse, ProviderFailure> {
        let body = self.build_body(request, false);
        let response = within(self.idle_timeout, self.post(&body).send()).await?;

        let status = response.status().as_u16();
        let text = within(self.idle_timeout, response.text()).await?;
        if !(200..300).contains(&status) {
            return Err(ProviderFailure::classified(classify_status(status, &text)));
        }

        let parsed: ClaudeResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderFailure::parse(format!("Invalid Claude response: {}", e)))?;
        Ok(convert_response(parsed, &self.pricing))
    }
}

fn default_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[async_trait]
impl LLMProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn stream(&self, request: ChatRequest, cancel: CancellationToken) -> ProviderStream {
        if !self.supports_streaming {
            let this = self.clone();
            let events = futures::stream::once(async move {
                match this.send_complete(&request).await {
                    Ok(response) => response.into_events(),
                    Err(failure) => vec![ProviderEvent::Failed(failure)],
                }
            })
            .flat_map(futures::stream::iter);
            return cancellable(events.boxed(), cancel);
        }

        let body = self.build_body(&request, true);
        sse_stream(
            self.post(&body),
            ClaudeFrameParser::new(self.pricing),
            self.idle_timeout,
            cancel,
        )
    }

    async fn complete(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<LLMResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StewardError::Cancelled),
            result = self.send_complete(&request) => result.map_err(ProviderFailure::into_error),
        }
    }
}

/// Map an HTTP error response to a classified error, preferring the
/// structured `error.type` Anthropic puts in the body.
fn classify_status(status: u16, body: &str) -> ProviderError {
    let detail = match serde_json::from_str::<ClaudeErrorResponse>(body) {
        Ok(err) => format!("{}: {}", err.error.r#type, err.error.message),
        Err(_) => body.to_string(),
    };
    if status == 529 || detail.contains("overloaded_error") {
        return ProviderError::Overloaded(detail);
    }
    parse_provider_error(status, &detail)
}

// ============================================================================
// Claude API Request Types
// ============================================================================

/// Claude API request body.
#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    /// Conversation messages (excluding system)
    messages: Vec<ClaudeMessage>,
    /// System prompt (separate from messages in Claude API)
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ClaudeTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// A message in Claude's format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClaudeMessage {
    /// Role: "user" or "assistant"
    role: String,
    content: Vec<ClaudeContentBlock>,
}

/// A content block within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ClaudeContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    /// Assistant requesting a tool call
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Result of a tool call, sent in a user turn
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        is_error: bool,
    },
}

/// Claude tool definition.
#[derive(Debug, Serialize)]
struct ClaudeTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// ============================================================================
// Claude API Response Types
// ============================================================================

/// Claude API (non-streaming) response body.
#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContentBlock>,
    usage: ClaudeUsage,
    stop_reason: Option<String>,
}

/// Claude API error response.
#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
    error: ClaudeError,
}

#[derive(Debug, Deserialize)]
struct ClaudeError {
    r#type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: u64,
    output_tokens: u64,
}

// ============================================================================
// Claude SSE Streaming Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SseEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    delta: Option<SseDelta>,
    #[serde(default)]
    content_block: Option<SseContentBlock>,
    #[serde(default)]
    usage: Option<SseUsage>,
    #[serde(default)]
    message: Option<SseMessage>,
    #[serde(default)]
    error: Option<ClaudeError>,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    #[serde(rename = "type", default)]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SseMessage {
    #[serde(default)]
    usage: Option<SseUsage>,
}

/// Translates Anthropic stream frames into provider events.
///
/// Usage arrives split across `message_start` (input) and `message_delta`
/// (cumulative output); one combined report is emitted at `message_stop`.
struct ClaudeFrameParser {
    pricing: Pricing,
    input_tokens: u64,
    output_tokens: u64,
    stop_reason: Option<String>,
    /// Content block index -> tool call id
    tool_blocks: HashMap<u32, String>,
    completed: bool,
}

impl ClaudeFrameParser {
    fn new(pricing: Pricing) -> Self {
        Self {
            pricing,
            input_tokens: 0,
            output_tokens: 0,
            stop_reason: None,
            tool_blocks: HashMap::new(),
            completed: false,
        }
    }
}

impl FrameParser for ClaudeFrameParser {
    fn parse(
        &mut self,
        data: &str,
    ) -> std::result::Result<Vec<ProviderEvent>, ProviderFailure> {
        let sse: SseEvent = serde_json::from_str(data)
            .map_err(|e| ProviderFailure::parse(format!("Invalid Claude stream frame: {}", e)))?;

        let mut events = Vec::new();
        match sse.event_type.as_str() {
            "message_start" => {
                if let Some(usage) = sse.message.and_then(|m| m.usage) {
                    self.input_tokens = usage.input_tokens.unwrap_or(0);
                    self.output_tokens = usage.output_tokens.unwrap_or(0);
                }
            }
            "content_block_start" => {
                if let Some(block) = sse.content_block {
                    match block.block_type.as_str() {
                        "tool_use" => {
                            let (Some(id), Some(name)) = (block.id, block.name) else {
                                return Err(ProviderFailure::parse(
                                    "tool_use block without id or name",
                                ));
                            };
                            if let Some(index) = sse.index {
                                self.tool_blocks.insert(index, id.clone());
                            }
                            events.push(ProviderEvent::ToolCallStart { id, name });
                        }
                        "text" => {
                            if let Some(text) = block.text.filter(|t| !t.is_empty()) {
                                events.push(ProviderEvent::TextDelta(text));
                            }
                        }
                        _ => {}
                    }
                }
            }
            "content_block_delta" => {
                if let Some(delta) = sse.delta {
                    match delta.delta_type.as_deref() {
                        Some("text_delta") => {
                            if let Some(text) = delta.text.filter(|t| !t.is_empty()) {
                                events.push(ProviderEvent::TextDelta(text));
                            }
                        }
                        Some("input_json_delta") => {
                            let id = sse.index.and_then(|i| self.tool_blocks.get(&i)).cloned();
                            if let (Some(id), Some(fragment)) =
                                (id, delta.partial_json.filter(|p| !p.is_empty()))
                            {
                                events.push(ProviderEvent::ToolCallArgDelta { id, fragment });
                            }
                        }
                        _ => {}
                    }
                }
            }
            "content_block_stop" => {
                if let Some(id) = sse.index.and_then(|i| self.tool_blocks.remove(&i)) {
                    events.push(ProviderEvent::ToolCallEnd { id });
                }
            }
            "message_delta" => {
                if let Some(reason) = sse.delta.and_then(|d| d.stop_reason) {
                    self.stop_reason = Some(reason);
                }
                if let Some(output) = sse.usage.and_then(|u| u.output_tokens) {
                    self.output_tokens = output;
                }
            }
            "message_stop" => {
                self.completed = true;
                events.push(ProviderEvent::UsageReport(UsageReport {
                    input_tokens: self.input_tokens,
                    output_tokens: self.output_tokens,
                    cost: self.pricing.cost(self.input_tokens, self.output_tokens),
                }));
                let reason = self.stop_reason.as_deref().unwrap_or("end_turn");
                events.push(ProviderEvent::Completed(FinishReason::from_vendor(reason)));
            }
            "error" => {
                let detail = sse
                    .error
                    .map(|e| format!("{}: {}", e.r#type, e.message))
                    .unwrap_or_else(|| data.to_string());
                return Err(ProviderFailure::classified(classify_error_message(&detail)));
            }
            // ping and future event types
            _ => {}
        }
        Ok(events)
    }

    fn finish(&mut self) -> Vec<ProviderEvent> {
        if self.completed {
            Vec::new()
        } else {
            vec![ProviderEvent::Failed(ProviderFailure::parse(
                "Claude stream ended before message_stop",
            ))]
        }
    }

    fn classify_status(&self, status: u16, body: &str) -> ProviderError {
        classify_status(status, body)
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert a request into Claude's system string and message list.
///
/// System turns are folded into the system prompt. Adjacent turns with the
/// same role are merged, since the API requires alternation.
fn convert_messages(request: &ChatRequest) -> (Option<String>, Vec<ClaudeMessage>) {
    let mut system_parts: Vec<String> = request.system.iter().cloned().collect();
    let mut messages: Vec<ClaudeMessage> = Vec::new();

    for turn in wire_turns(&request.messages) {
        let (role, blocks) = match turn {
            WireTurn::System(text) => {
                system_parts.push(text);
                continue;
            }
            WireTurn::User(text) => ("user", vec![ClaudeContentBlock::Text { text }]),
            WireTurn::Assistant { text, calls } => {
                let mut blocks = Vec::new();
                if !text.is_empty() {
                    blocks.push(ClaudeContentBlock::Text { text });
                }
                blocks.extend(calls.into_iter().map(|c| ClaudeContentBlock::ToolUse {
                    id: c.id,
                    name: c.name,
                    input: c.arguments,
                }));
                ("assistant", blocks)
            }
            WireTurn::ToolResults(results) => (
                "user",
                results
                    .into_iter()
                    .map(|r| ClaudeContentBlock::ToolResult {
                        tool_use_id: r.call_id,
                        content: r.content,
                        is_error: r.is_error,
                    })
                    .collect(),
            ),
        };

        if blocks.is_empty() {
            continue;
        }
        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(ClaudeMessage {
                role: role.to_string(),
                content: blocks,
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, messages)
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<ClaudeTool> {
    tools
        .iter()
        .map(|t| ClaudeTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.parameters.clone(),
        })
        .collect()
}

fn convert_response(response: ClaudeResponse, pricing: &Pricing) -> LLMResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            ClaudeContentBlock::Text { text } => content.push_str(&text),
            ClaudeContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(LLMToolCall::new(&id, &name, &input.to_string()));
            }
            ClaudeContentBlock::ToolResult { .. } => {}
        }
    }

    let mut usage = Usage::new(response.usage.input_tokens, response.usage.output_tokens);
    usage.cost = pricing.cost(usage.input_tokens, usage.output_tokens);

    LLMResponse {
        content,
        tool_calls,
        usage: Some(usage),
        finish_reason: response.stop_reason.as_deref().map(FinishReason::from_vendor),
    }
}
