//! OpenAI Provider Implementation
//!
//! This module implements the `LLMProvider` trait for OpenAI's Chat Completions API
//! (and compatible endpoints), handling message conversion, streamed tool calls,
//! and usage reporting.
//!
//! # Example
//!
//! ```rust,ignore
//! use steward::providers::{ChatRequest, LLMProvider, OpenAIProvider};
//! use steward::session::Message;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key");
//!     let request = ChatRequest::new(vec![Message::user("Hello!")])
//!         .with_system("You are a helpful assistant.");
//!
//!     let response = provider
//!         .complete(request, CancellationToken::new())
//!         .await
//!         .unwrap();
//!
//!     println!("OpenAI: {}", response.content);
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

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

/// The OpenAI API endpoint URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// The default OpenAI model to use.
const DEFAULT_MODEL: &str = "gpt-4o";

// ============================================================================
// OpenAI API Request Types
// ============================================================================

/// OpenAI API request body.
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    /// Conversation messages (including system)
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    /// Ask for a trailing usage chunk when streaming
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// A message in OpenAI's format.
#[derive(Debug, Serialize)]
struct OpenAIMessage {
    /// Role: "system", "user", "assistant", or "tool"
    role: String,
    /// Message content (can be null for assistant with tool_calls)
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest>>,
    /// ID of the tool call this message is responding to
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAIMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A tool call in a request (assistant requesting tool execution).
#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest {
    id: String,
    /// Always "function"
    r#type: String,
    function: OpenAIFunctionCall,
}

/// Function call details.
#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

/// OpenAI tool definition.
#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunctionDef,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionDef {
    name: String,
    description: String,
    /// JSON Schema for function parameters
    parameters: serde_json::Value,
}

// ============================================================================
// OpenAI API Response Types
// ============================================================================

/// OpenAI API (non-streaming) response body.
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    /// Text content (may be null if tool_calls present)
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallResponse {
    id: String,
    function: OpenAIFunctionCall,
}

/// OpenAI token usage.
#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAIError {
    fn detail(&self) -> String {
        let mut parts = Vec::new();
        if let Some(t) = &self.r#type {
            parts.push(t.clone());
        }
        if let Some(serde_json::Value::String(code)) = &self.code {
            parts.push(code.clone());
        }
        parts.push(self.message.clone());
        parts.join(": ")
    }
}

// ============================================================================
// OpenAI Streaming Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
    #[serde(default)]
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<StreamToolCall>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Translates Chat Completions stream chunks into provider events.
///
/// Tool calls are keyed by `index`; only the first chunk for an index carries
/// the id and name. Calls are closed when the choice reports a finish reason.
struct OpenAIFrameParser {
    pricing: Pricing,
    calls: HashMap<u32, String>,
    /// Open call ids in start order
    open: Vec<String>,
    finish_reason: Option<String>,
    done: bool,
}

impl OpenAIFrameParser {
    fn new(pricing: Pricing) -> Self {
        Self {
            pricing,
            calls: HashMap::new(),
            open: Vec::new(),
            finish_reason: None,
            done: false,
        }
    }

    /// Close any tool calls still open, then complete. Some compatible
    /// servers send `[DONE]` without a `finish_reason` chunk.
    fn completion(&mut self) -> Vec<ProviderEvent> {
        self.done = true;
        let mut events: Vec<ProviderEvent> = self
            .open
            .drain(..)
            .map(|id| ProviderEvent::ToolCallEnd { id })
            .collect();
        let fallback = if events.is_empty() { "stop" } else { "tool_calls" };
        let reason = self.finish_reason.as_deref().unwrap_or(fallback);
        events.push(ProviderEvent::Completed(FinishReason::from_vendor(reason)));
        events
    }
}

impl FrameParser for OpenAIFrameParser {
    fn parse(
        &mut self,
        data: &str,
    ) -> std::result::Result<Vec<ProviderEvent>, ProviderFailure> {
        if data.trim() == "[DONE]" {
            return Ok(self.completion());
        }

        let chunk: StreamChunk = serde_json::from_str(data)
            .map_err(|e| ProviderFailure::parse(format!("Invalid OpenAI stream chunk: {}", e)))?;

        if let Some(error) = chunk.error {
            return Err(ProviderFailure::classified(classify_error_message(
                &error.detail(),
            )));
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                events.push(ProviderEvent::TextDelta(text));
            }

            for call in choice.delta.tool_calls {
                let function = call.function.unwrap_or(StreamFunction {
                    name: None,
                    arguments: None,
                });
                let id = match self.calls.get(&call.index) {
                    Some(id) => id.clone(),
                    None => {
                        let id = call
                            .id
                            .filter(|id| !id.is_empty())
                            .unwrap_or_else(|| format!("call_{}", call.index));
                        let name = function.name.clone().unwrap_or_default();
                        self.calls.insert(call.index, id.clone());
                        self.open.push(id.clone());
                        events.push(ProviderEvent::ToolCallStart {
                            id: id.clone(),
                            name,
                        });
                        id
                    }
                };
                if let Some(fragment) = function.arguments.filter(|a| !a.is_empty()) {
                    events.push(ProviderEvent::ToolCallArgDelta { id, fragment });
                }
            }

            if let Some(reason) = choice.finish_reason {
                for id in self.open.drain(..) {
                    events.push(ProviderEvent::ToolCallEnd { id });
                }
                self.finish_reason = Some(reason);
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(ProviderEvent::UsageReport(UsageReport {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cost: self
                    .pricing
                    .cost(usage.prompt_tokens, usage.completion_tokens),
            }));
        }

        Ok(events)
    }

    fn finish(&mut self) -> Vec<ProviderEvent> {
        if self.done {
            return Vec::new();
        }
        // Some compatible servers close the body without a [DONE] marker.
        if self.finish_reason.is_some() {
            debug!("OpenAI stream closed without [DONE]");
            return self.completion();
        }
        vec![ProviderEvent::Failed(ProviderFailure::parse(
            "OpenAI stream ended before a finish reason",
        ))]
    }

    fn classify_status(&self, status: u16, body: &str) -> ProviderError {
        classify_status(status, body)
    }
}

fn classify_status(status: u16, body: &str) -> ProviderError {
    let detail = match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(err) => err.error.detail(),
        Err(_) => body.to_string(),
    };
    if detail.contains("insufficient_quota") {
        return ProviderError::Billing(detail);
    }
    parse_provider_error(status, &detail)
}

// ============================================================================
// OpenAI Provider
// ============================================================================

/// OpenAI LLM provider.
///
/// Works with any endpoint that speaks the Chat Completions protocol.
#[derive(Clone)]
pub struct OpenAIProvider {
    api_key: String,
    api_base: String,
    model: String,
    client: Client,
    supports_tools: bool,
    supports_streaming: bool,
    pricing: Pricing,
    idle_timeout: Duration,
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("supports_tools", &self.supports_tools)
            .field("supports_streaming", &self.supports_streaming)
            .finish_non_exhaustive()
    }
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given API key.
    ///
    /// # Example
    /// ```
    /// use steward::providers::{LLMProvider, OpenAIProvider};
    ///
    /// let provider = OpenAIProvider::new("sk-xxx");
    /// assert_eq!(provider.name(), "openai");
    /// assert_eq!(provider.default_model(), "gpt-4o");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL)
    }

    /// Create a provider for an OpenAI-compatible endpoint.
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
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
            .ok_or_else(|| StewardError::Config("OpenAI API key not configured".into()))?;

        let mut provider = Self::with_base_url(
            api_key,
            config.api_base.as_deref().unwrap_or(OPENAI_API_URL),
        );
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

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> OpenAIRequest {
        let tools = if self.supports_tools && !request.tools.is_empty() {
            Some(convert_tools(&request.tools))
        } else {
            None
        };

        OpenAIRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.model.clone()),
            messages: convert_messages(request),
            tools,
            max_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
            top_p: request.options.top_p,
            stop: request.options.stop.clone(),
            stream: if stream { Some(true) } else { None },
            stream_options: if stream {
                Some(StreamOptions {
                    include_usage: true,
                })
            } else {
                None
            },
        }
    }

    fn post(&self, body: &OpenAIRequest) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
    }

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

        let parsed: OpenAIResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderFailure::parse(format!("Invalid OpenAI response: {}", e)))?;
        convert_response(parsed, &self.pricing)
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
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
            OpenAIFrameParser::new(self.pricing),
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

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert a request into OpenAI's flat message list. The system prompt leads.
fn convert_messages(request: &ChatRequest) -> Vec<OpenAIMessage> {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(OpenAIMessage::text("system", system.clone()));
    }

    for turn in wire_turns(&request.messages) {
        match turn {
            WireTurn::System(text) => messages.push(OpenAIMessage::text("system", text)),
            WireTurn::User(text) => messages.push(OpenAIMessage::text("user", text)),
            WireTurn::Assistant { text, calls } => {
                let tool_calls = if calls.is_empty() {
                    None
                } else {
                    Some(
                        calls
                            .into_iter()
                            .map(|c| OpenAIToolCallRequest {
                                id: c.id,
                                r#type: "function".to_string(),
                                function: OpenAIFunctionCall {
                                    name: c.name,
                                    arguments: c.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                };
                let content = if text.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(text)
                };
                messages.push(OpenAIMessage {
                    role: "assistant".to_string(),
                    content,
                    tool_calls,
                    tool_call_id: None,
                });
            }
            WireTurn::ToolResults(results) => {
                messages.extend(results.into_iter().map(|r| OpenAIMessage {
                    role: "tool".to_string(),
                    content: Some(r.content),
                    tool_calls: None,
                    tool_call_id: Some(r.call_id),
                }));
            }
        }
    }
    messages
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<OpenAITool> {
    tools
        .iter()
        .map(|t| OpenAITool {
            r#type: "function".to_string(),
            function: OpenAIFunctionDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

fn convert_response(
    response: OpenAIResponse,
    pricing: &Pricing,
) -> std::result::Result<LLMResponse, ProviderFailure> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderFailure::parse("OpenAI response has no choices"))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| LLMToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments))
        .collect();

    let usage = response.usage.map(|u| {
        let mut usage = Usage::new(u.prompt_tokens, u.completion_tokens);
        usage.cost = pricing.cost(u.prompt_tokens, u.completion_tokens);
        usage
    });

    Ok(LLMResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        usage,
        finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_vendor),
    })
}
