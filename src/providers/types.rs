//! Provider types for Steward
//!
//! This module defines the `LLMProvider` trait and the request/response types
//! shared by every vendor client.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StewardError};
use crate::session::Message;

use super::event::{FinishReason, ProviderEvent, ProviderFailure, ProviderStream};

/// Definition of a tool that can be called by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use steward::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "read_file",
    ///     "Read a file from the workspace",
    ///     json!({
    ///         "type": "object",
    ///         "properties": { "path": { "type": "string" } },
    ///         "required": ["path"]
    ///     }),
    /// );
    /// assert_eq!(tool.name, "read_file");
    /// ```
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Options for chat completion requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter
    pub top_p: Option<f32>,
    /// Stop sequences that halt generation
    pub stop: Option<Vec<String>>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of tokens to generate.
    ///
    /// # Example
    /// ```
    /// use steward::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new().with_max_tokens(1000);
    /// assert_eq!(options.max_tokens, Some(1000));
    /// ```
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the top_p (nucleus sampling) parameter.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set stop sequences that will halt generation.
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Everything a provider needs for one call.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System prompt, sent through the vendor's dedicated channel
    pub system: Option<String>,
    /// Conversation history in vendor-agnostic form
    pub messages: Vec<Message>,
    /// Tool catalog offered to the model
    pub tools: Vec<ToolDefinition>,
    /// Model override (uses the provider default if None)
    pub model: Option<String>,
    pub options: ChatOptions,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: &str) -> Self {
        self.system = Some(system.to_string());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }
}

/// Trait for LLM providers (OpenAI, Anthropic, etc.).
///
/// The provider translates between Steward's message format and the vendor
/// wire format. `stream` is the primary entry point: it returns immediately
/// and performs no I/O until the returned stream is first polled.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Get the provider name (e.g. "anthropic", "openai").
    fn name(&self) -> &str;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Start a streaming call.
    ///
    /// The stream ends after one `Completed` or `Failed` event. When `cancel`
    /// fires it ends without any further event.
    fn stream(&self, request: ChatRequest, cancel: CancellationToken) -> ProviderStream;

    /// Run a call to completion and return the assembled response.
    ///
    /// Vendors may override this with a non-streaming request.
    async fn complete(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<LLMResponse> {
        let stream = self.stream(request, cancel.clone());
        collect_response(stream, &cancel).await
    }
}

/// Drain a provider stream into a single response.
///
/// `Reset` discards everything gathered so far. A stream that ends without a
/// terminal event is a parse failure unless `cancel` fired.
pub async fn collect_response(
    mut stream: ProviderStream,
    cancel: &CancellationToken,
) -> Result<LLMResponse> {
    let mut response = LLMResponse::default();

    while let Some(event) = stream.next().await {
        match event {
            ProviderEvent::TextDelta(text) => response.content.push_str(&text),
            ProviderEvent::ToolCallStart { id, name } => {
                response.tool_calls.push(LLMToolCall::new(&id, &name, ""));
            }
            ProviderEvent::ToolCallArgDelta { id, fragment } => {
                if let Some(call) = response.tool_calls.iter_mut().find(|c| c.id == id) {
                    call.arguments.push_str(&fragment);
                }
            }
            ProviderEvent::ToolCallEnd { .. } => {}
            ProviderEvent::UsageReport(report) => {
                let usage = response.usage.get_or_insert_with(Usage::default);
                usage.input_tokens += report.input_tokens;
                usage.output_tokens += report.output_tokens;
                usage.cost += report.cost;
            }
            ProviderEvent::Reset { .. } => {
                response.content.clear();
                response.tool_calls.clear();
            }
            ProviderEvent::Completed(reason) => {
                response.finish_reason = Some(reason);
                return Ok(response);
            }
            ProviderEvent::Failed(failure) => return Err(failure.into_error()),
        }
    }

    if cancel.is_cancelled() {
        Err(StewardError::Cancelled)
    } else {
        Err(ProviderFailure::parse("stream ended before completion").into_error())
    }
}

/// Response from an LLM chat completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Text content of the response
    pub content: String,
    /// Tool calls made by the LLM (if any)
    pub tool_calls: Vec<LLMToolCall>,
    /// Token usage information (if available)
    pub usage: Option<Usage>,
    /// Why the model stopped
    pub finish_reason: Option<FinishReason>,
}

impl LLMResponse {
    /// Create a simple text response with no tool calls.
    ///
    /// # Example
    /// ```
    /// use steward::providers::LLMResponse;
    ///
    /// let response = LLMResponse::text("Hello, world!");
    /// assert_eq!(response.content, "Hello, world!");
    /// assert!(!response.has_tool_calls());
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }

    /// Create a response with tool calls.
    pub fn with_tools(content: &str, tool_calls: Vec<LLMToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
            ..Default::default()
        }
    }

    /// Check if this response contains any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Set usage information for this response.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Replay this response as the equivalent event sequence.
    ///
    /// Used by providers whose endpoint cannot stream.
    pub fn into_events(self) -> Vec<ProviderEvent> {
        let mut events = Vec::new();
        if !self.content.is_empty() {
            events.push(ProviderEvent::TextDelta(self.content));
        }
        for call in self.tool_calls {
            events.push(ProviderEvent::ToolCallStart {
                id: call.id.clone(),
                name: call.name,
            });
            if !call.arguments.is_empty() {
                events.push(ProviderEvent::ToolCallArgDelta {
                    id: call.id.clone(),
                    fragment: call.arguments,
                });
            }
            events.push(ProviderEvent::ToolCallEnd { id: call.id });
        }
        if let Some(usage) = self.usage {
            events.push(ProviderEvent::UsageReport(super::UsageReport {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cost: usage.cost,
            }));
        }
        events.push(ProviderEvent::Completed(
            self.finish_reason.unwrap_or(FinishReason::EndTurn),
        ));
        events
    }
}

/// A tool call made by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to execute
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl LLMToolCall {
    /// Create a new tool call.
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

/// Token usage information from a completion request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Cost in USD
    pub cost: f64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cost: 0.0,
        }
    }
}

/// Per-million-token prices used to derive the cost of a usage report.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl Pricing {
    /// Cost in USD for the given token counts.
    ///
    /// # Example
    /// ```
    /// use steward::providers::Pricing;
    ///
    /// let pricing = Pricing { input_per_mtok: 3.0, output_per_mtok: 15.0 };
    /// let cost = pricing.cost(1_000_000, 100_000);
    /// assert!((cost - 4.5).abs() < 1e-9);
    /// ```
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_mtok + output_tokens as f64 * self.output_per_mtok)
            / 1_000_000.0
    }
}
