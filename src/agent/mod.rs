//! Agent module - the turn state machine
//!
//! The agent is responsible for:
//!
//! - Building the provider request from the session and system prompt
//! - Consuming the provider's event stream into assistant text and tool calls
//! - Dispatching tool calls in order and feeding results back to the model
//! - Ending every turn in exactly one of completed, cancelled or errored
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Session   │<───>│  AgentLoop  │────>│ LLMProvider │
//! │             │     │             │<────│  (events)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │    Tool     │────>│ Permission  │
//!                     │ Dispatcher  │     │    Gate     │
//!                     └─────────────┘     └─────────────┘
//! ```

pub mod compaction;
mod context;
mod r#loop;

pub use context::{ContextBuilder, RuntimeContext};
pub use r#loop::{AgentLoop, TurnEnd, TurnOutcome};
