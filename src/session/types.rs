//! Session types for Steward
//!
//! This module defines the core types for conversation state: sessions,
//! messages and their content parts, tool calls, and usage counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of the most recent turn on a session.
///
/// A successfully completed turn returns the session to `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    #[default]
    Idle,
    Running,
    Cancelled,
    Errored,
}

/// Cumulative token and cost counters. Never decrease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Accumulated cost in USD
    pub cost: f64,
}

impl UsageCounters {
    /// Add a usage report. Negative or non-finite costs are ignored so the
    /// counters stay monotonic.
    pub fn add(&mut self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.input_tokens = self.input_tokens.saturating_add(input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(output_tokens);
        if cost.is_finite() && cost > 0.0 {
            self.cost += cost;
        }
    }

    /// Total tokens in both directions.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// A conversation session containing messages and metadata.
///
/// Messages are append-only; the agent loop is the only writer while a turn
/// is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session
    pub id: String,
    /// Short title, derived from the first user message
    pub title: Option<String>,
    /// Model identifier used for this session's turns
    pub model: String,
    messages: Vec<Message>,
    usage: UsageCounters,
    status: TurnStatus,
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// When this session was last modified
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session.
    ///
    /// # Example
    /// ```
    /// use steward::session::{Session, TurnStatus};
    ///
    /// let session = Session::new("chat-1", "claude-sonnet-4-5-20250929");
    /// assert!(session.messages().is_empty());
    /// assert_eq!(session.status(), TurnStatus::Idle);
    /// ```
    pub fn new(id: &str, model: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            title: None,
            model: model.to_string(),
            messages: Vec::new(),
            usage: UsageCounters::default(),
            status: TurnStatus::Idle,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a session with a freshly generated UUID.
    pub fn generate(model: &str) -> Self {
        Self::new(&uuid::Uuid::new_v4().to_string(), model)
    }

    /// Append a message and bump `updated_at`.
    ///
    /// The first user message also sets the title when none is set.
    ///
    /// # Example
    /// ```
    /// use steward::session::{Message, Session};
    ///
    /// let mut session = Session::new("s", "m");
    /// session.add_message(Message::user("Hello!"));
    /// assert_eq!(session.messages().len(), 1);
    /// assert_eq!(session.title.as_deref(), Some("Hello!"));
    /// ```
    pub fn add_message(&mut self, message: Message) {
        if self.title.is_none() && message.role == Role::User {
            self.title = Some(derive_title(&message.text()));
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// All messages in append order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get messages by role.
    pub fn messages_by_role(&self, role: Role) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.role == role).collect()
    }

    /// Get the last message in this session, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Text of the most recent assistant message.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(Message::text)
    }

    /// Cumulative usage counters.
    pub fn usage(&self) -> UsageCounters {
        self.usage
    }

    /// Record one provider usage report.
    pub fn record_usage(&mut self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.usage.add(input_tokens, output_tokens, cost);
        self.updated_at = Utc::now();
    }

    /// Status of the latest turn.
    pub fn status(&self) -> TurnStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: TurnStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Replace the whole history. Only used by summarization between turns.
    pub(crate) fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.updated_at = Utc::now();
    }
}

fn derive_title(text: &str) -> String {
    const MAX_TITLE_CHARS: usize = 60;
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() <= MAX_TITLE_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(MAX_TITLE_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Condensed history produced by summarization
    System,
    User,
    Assistant,
    /// Tool invocation together with its result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One piece of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ContentPart>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            parts,
            created_at: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(text: &str) -> Self {
        Self::with_parts(
            Role::User,
            vec![ContentPart::Text {
                text: text.to_string(),
            }],
        )
    }

    /// Create a new assistant message.
    pub fn assistant(text: &str) -> Self {
        Self::with_parts(
            Role::Assistant,
            vec![ContentPart::Text {
                text: text.to_string(),
            }],
        )
    }

    /// Create a new system message.
    pub fn system(text: &str) -> Self {
        Self::with_parts(
            Role::System,
            vec![ContentPart::Text {
                text: text.to_string(),
            }],
        )
    }

    /// Create a tool message holding a finished call and its result.
    ///
    /// # Example
    /// ```
    /// use steward::session::{Message, Role, ToolCall, ToolCallStatus, ToolResult};
    ///
    /// let mut call = ToolCall::new("call_1", "ls", "{}");
    /// call.status = ToolCallStatus::Completed;
    /// let msg = Message::tool(call, ToolResult::success("call_1", "a.txt"));
    /// assert_eq!(msg.role, Role::Tool);
    /// assert_eq!(msg.tool_call().unwrap().status, ToolCallStatus::Completed);
    /// ```
    pub fn tool(call: ToolCall, result: ToolResult) -> Self {
        Self::with_parts(
            Role::Tool,
            vec![ContentPart::ToolCall(call), ContentPart::ToolResult(result)],
        )
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The tool call carried by this message, if any.
    pub fn tool_call(&self) -> Option<&ToolCall> {
        self.parts.iter().find_map(|p| match p {
            ContentPart::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    /// The tool result carried by this message, if any.
    pub fn tool_result(&self) -> Option<&ToolResult> {
        self.parts.iter().find_map(|p| match p {
            ContentPart::ToolResult(result) => Some(result),
            _ => None,
        })
    }
}

/// Lifecycle of a tool call. `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    #[default]
    Pending,
    PermissionWait,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ToolCallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ToolCallStatus::Completed | ToolCallStatus::Failed | ToolCallStatus::Cancelled
        )
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned identifier, unique within a turn
    pub id: String,
    /// Name of the tool to execute
    pub name: String,
    /// Arguments exactly as streamed by the provider (JSON text)
    pub raw_arguments: String,
    pub status: ToolCallStatus,
}

impl ToolCall {
    /// Create a new pending tool call.
    pub fn new(id: &str, name: &str, raw_arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            raw_arguments: raw_arguments.to_string(),
            status: ToolCallStatus::Pending,
        }
    }

    /// Parse the arguments as JSON. Empty arguments parse as `{}`.
    pub fn arguments(&self) -> serde_json::Result<serde_json::Value> {
        if self.raw_arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        serde_json::from_str(&self.raw_arguments)
    }
}

/// The outcome of a tool call as fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call_id: &str, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.to_string(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: &str, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.to_string(),
            content: content.into(),
            is_error: true,
        }
    }
}
