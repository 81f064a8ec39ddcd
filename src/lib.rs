//! Steward - agent execution loop with streaming providers and gated tools
//!
//! A turn takes one user message, streams a model response from a pluggable
//! provider (Anthropic or OpenAI-compatible, with retry), executes the tool
//! calls the model requests behind a permission gate, and repeats until the
//! model answers, the caller cancels, or the provider fails for good.

pub mod agent;
pub mod config;
pub mod error;
pub mod history;
pub mod providers;
pub mod security;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{AgentLoop, TurnEnd, TurnOutcome};
pub use config::Config;
pub use error::{Result, StewardError};
pub use providers::{
    ChatOptions, ChatRequest, ClaudeProvider, LLMProvider, LLMResponse, OpenAIProvider,
    ProviderEvent, RetryProvider, ToolDefinition, Usage,
};
pub use session::{Message, Role, Session, SessionManager, SessionStore, ToolCall};
pub use tools::{PermissionDecision, PermissionGate, Tool, ToolRegistry};
