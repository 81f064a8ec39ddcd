//! Providers module - LLM providers (OpenAI, Anthropic, etc.)
//!
//! This module defines the `LLMProvider` trait and common types for
//! interacting with various LLM providers. Each vendor translates its own
//! streaming wire format into the shared [`ProviderEvent`] vocabulary.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use steward::providers::{ChatOptions, ChatRequest, ClaudeProvider, LLMProvider, ProviderEvent};
//! use steward::session::Message;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() {
//!     let provider = ClaudeProvider::new("your-api-key");
//!     let request = ChatRequest::new(vec![Message::user("Hello!")])
//!         .with_options(ChatOptions::new().with_max_tokens(1000));
//!
//!     let mut events = provider.stream(request, CancellationToken::new());
//!     while let Some(event) = events.next().await {
//!         if let ProviderEvent::TextDelta(text) = event {
//!             print!("{}", text);
//!         }
//!     }
//! }
//! ```

pub mod claude;
pub mod convert;
pub mod error_classifier;
mod event;
pub mod openai;
mod registry;
pub mod retry;
mod scripted;
pub mod sse;
mod types;

use crate::error::ProviderError;

pub use claude::ClaudeProvider;
pub use event::{
    FailureKind, FinishReason, ProviderEvent, ProviderFailure, ProviderStream, UsageReport,
};
pub use openai::OpenAIProvider;
pub use registry::{build_provider, resolve_provider, Vendor};
pub use retry::RetryProvider;
pub use scripted::ScriptedProvider;
pub use types::{
    collect_response, ChatOptions, ChatRequest, LLMProvider, LLMResponse, LLMToolCall, Pricing,
    ToolDefinition, Usage,
};

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
///
/// This centralizes the mapping from HTTP status codes to error classifications
/// so that both Claude and OpenAI providers produce consistent typed errors.
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body.to_string()),
        402 => ProviderError::Billing(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        408 => ProviderError::Timeout(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 | 413 | 422 => ProviderError::InvalidRequest(body.to_string()),
        503 | 529 => ProviderError::Overloaded(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}
