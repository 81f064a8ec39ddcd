//! Context builder for agent conversations
//!
//! This module provides the `ContextBuilder` for constructing the system prompt
//! and the provider request for each round of a turn. It also provides
//! `RuntimeContext` for injecting environment-awareness into the system prompt.

use crate::providers::{ChatOptions, ChatRequest, ToolDefinition};
use crate::session::Session;

/// Default system prompt for the Steward agent
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Steward, an AI assistant that works inside a user's workspace.

You have access to tools to help accomplish tasks. Use them when needed, and
prefer reading before writing.

Be concise but helpful. Focus on completing the user's request efficiently."#;

/// Runtime context injected into the system prompt.
///
/// When rendered, it produces a `## Runtime Context` section appended to the
/// system prompt.
///
/// # Example
///
/// ```rust
/// use steward::agent::RuntimeContext;
///
/// let ctx = RuntimeContext::new()
///     .with_tools(vec!["shell".to_string(), "read_file".to_string()])
///     .with_workspace("/home/user/project")
///     .with_os_info();
///
/// let rendered = ctx.render().unwrap();
/// assert!(rendered.contains("shell, read_file"));
/// assert!(rendered.contains("Workspace: /home/user/project"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    /// Names of available tools
    pub available_tools: Vec<String>,
    /// Current timestamp (RFC 3339)
    pub current_time: Option<String>,
    /// Workspace path
    pub workspace: Option<String>,
    /// OS/platform info (e.g., "linux aarch64")
    pub os_info: Option<String>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.available_tools = tools;
        self
    }

    /// Set the current time to now (UTC).
    pub fn with_current_time(mut self) -> Self {
        self.current_time = Some(chrono::Utc::now().to_rfc3339());
        self
    }

    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }

    /// Set the OS/platform info from the current environment.
    pub fn with_os_info(mut self) -> Self {
        self.os_info = Some(format!(
            "{} {}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ));
        self
    }

    /// Check if any context field is set.
    pub fn is_empty(&self) -> bool {
        self.available_tools.is_empty()
            && self.current_time.is_none()
            && self.workspace.is_none()
            && self.os_info.is_none()
    }

    /// Render the context as a markdown section, or `None` when empty.
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut parts = Vec::new();
        if !self.available_tools.is_empty() {
            parts.push(format!(
                "- Available tools: {}",
                self.available_tools.join(", ")
            ));
        }
        if let Some(ref time) = self.current_time {
            parts.push(format!("- Current time: {}", time));
        }
        if let Some(ref workspace) = self.workspace {
            parts.push(format!("- Workspace: {}", workspace));
        }
        if let Some(ref os) = self.os_info {
            parts.push(format!("- Platform: {}", os));
        }

        Some(format!("## Runtime Context\n\n{}", parts.join("\n")))
    }
}

/// Builds the provider request for each round of a turn.
///
/// The system prompt travels in [`ChatRequest::system`]; the session's
/// messages follow unchanged.
///
/// # Example
///
/// ```rust
/// use steward::agent::ContextBuilder;
/// use steward::providers::ChatOptions;
/// use steward::session::{Message, Session};
///
/// let mut session = Session::new("s", "model-x");
/// session.add_message(Message::user("Hello!"));
///
/// let request = ContextBuilder::new()
///     .with_system_prompt("Be brief.")
///     .build_request(&session, vec![], ChatOptions::new());
/// assert_eq!(request.system.as_deref(), Some("Be brief."));
/// assert_eq!(request.messages.len(), 1);
/// assert_eq!(request.model.as_deref(), Some("model-x"));
/// ```
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
    runtime_context: Option<RuntimeContext>,
}

impl ContextBuilder {
    /// Create a new context builder with the default system prompt.
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            runtime_context: None,
        }
    }

    /// Set a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Append a runtime context section to the system prompt.
    pub fn with_runtime_context(mut self, ctx: RuntimeContext) -> Self {
        self.runtime_context = Some(ctx);
        self
    }

    /// Get the current system prompt (without runtime context).
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// The full system prompt sent to the provider.
    pub fn build_system_prompt(&self) -> String {
        let mut content = self.system_prompt.clone();
        if let Some(rendered) = self.runtime_context.as_ref().and_then(RuntimeContext::render) {
            content.push_str("\n\n");
            content.push_str(&rendered);
        }
        content
    }

    /// Build the request for the next provider call on `session`.
    pub fn build_request(
        &self,
        session: &Session,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> ChatRequest {
        let mut request = ChatRequest::new(session.messages().to_vec())
            .with_system(&self.build_system_prompt())
            .with_tools(tools)
            .with_options(options);
        if !session.model.is_empty() {
            request = request.with_model(&session.model);
        }
        request
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
