//! Agent loop implementation
//!
//! This module provides the core agent loop: one turn takes a user message,
//! streams a provider call, dispatches the tool calls the model requested,
//! feeds the results back and repeats until the model answers without tools,
//! the turn is cancelled, or the provider fails for good.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{AgentDefaults, Config};
use crate::error::{Result, StewardError};
use crate::history::FileHistory;
use crate::providers::{
    resolve_provider, ChatOptions, ChatRequest, FinishReason, LLMProvider, ProviderEvent,
    ProviderFailure,
};
use crate::session::{Message, Session, SessionStore, ToolCall, TurnStatus};
use crate::tools::mcp::register_mcp_tools;
use crate::tools::{
    register_builtin_tools, PermissionGate, ToolContext, ToolDispatcher, ToolRegistry,
};

use super::compaction::{
    build_summary_prompt, needs_summary, summarize_messages, SUMMARY_SYSTEM_PROMPT,
};
use super::context::{ContextBuilder, RuntimeContext};

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    /// The model answered without requesting further tools.
    Completed,
    /// The caller's cancellation token fired.
    Cancelled,
    /// A fatal provider error, exhausted retries, or the iteration bound.
    Errored,
}

/// Terminal result of a turn. The session holds everything produced before
/// the turn ended, partial text included.
#[derive(Debug)]
pub struct TurnOutcome {
    pub status: TurnEnd,
    /// Assistant text of the last provider round (partial when the turn did
    /// not complete)
    pub final_text: String,
    /// Cause of an `Errored` turn
    pub error: Option<StewardError>,
    /// Provider calls made
    pub iterations: usize,
}

impl TurnOutcome {
    fn new(status: TurnEnd, final_text: String, error: Option<StewardError>, iterations: usize) -> Self {
        Self {
            status,
            final_text,
            error,
            iterations,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TurnEnd::Completed
    }
}

/// Marks a session as having a running turn; released on drop.
struct ActiveTurn {
    active: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl ActiveTurn {
    fn acquire(active: &Arc<Mutex<HashSet<String>>>, session_id: &str) -> Result<Self> {
        let mut set = active
            .lock()
            .map_err(|_| StewardError::Session("active turn registry poisoned".into()))?;
        if !set.insert(session_id.to_string()) {
            return Err(StewardError::TurnInProgress(session_id.to_string()));
        }
        Ok(Self {
            active: Arc::clone(active),
            session_id: session_id.to_string(),
        })
    }
}

impl Drop for ActiveTurn {
    fn drop(&mut self) {
        if let Ok(mut set) = self.active.lock() {
            set.remove(&self.session_id);
        }
    }
}

enum RoundEnd {
    Completed(FinishReason),
    Failed(ProviderFailure),
    Cancelled,
}

/// What one provider call produced.
struct Round {
    text: String,
    /// Finalized calls in `ToolCallEnd` order
    calls: Vec<ToolCall>,
    end: RoundEnd,
}

/// The agent loop. Cheap to clone; clones share the provider, the tool
/// registry, the permission gate and the set of sessions with a running turn.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use steward::agent::{AgentLoop, TurnEnd};
/// use steward::config::AgentDefaults;
/// use steward::providers::{ScriptedProvider, UsageReport};
/// use steward::session::Session;
/// use steward::tools::{AllowAllGate, ToolRegistry};
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let provider = ScriptedProvider::new(vec![
///     ScriptedProvider::text_reply(&["Hello", " there"], UsageReport::default()),
/// ]);
/// let agent = AgentLoop::new(
///     AgentDefaults::default(),
///     Arc::new(provider),
///     ToolRegistry::new(),
///     Arc::new(AllowAllGate),
/// );
///
/// let mut session = Session::new("demo", "scripted-model");
/// let outcome = agent
///     .run_turn(&mut session, "Hi", &CancellationToken::new())
///     .await
///     .unwrap();
/// assert_eq!(outcome.status, TurnEnd::Completed);
/// assert_eq!(session.last_assistant_text().as_deref(), Some("Hello there"));
/// # });
/// ```
#[derive(Clone)]
pub struct AgentLoop {
    settings: AgentDefaults,
    provider: Arc<dyn LLMProvider>,
    dispatcher: ToolDispatcher,
    context_builder: ContextBuilder,
    history: Option<Arc<dyn FileHistory>>,
    store: Option<Arc<dyn SessionStore>>,
    active: Arc<Mutex<HashSet<String>>>,
}

impl AgentLoop {
    /// Create an agent loop over a fixed tool registry.
    pub fn new(
        settings: AgentDefaults,
        provider: Arc<dyn LLMProvider>,
        registry: ToolRegistry,
        gate: Arc<dyn PermissionGate>,
    ) -> Self {
        let workspace = settings.workspace_path().to_string_lossy().to_string();
        let runtime = RuntimeContext::new()
            .with_tools(registry.names().into_iter().map(String::from).collect())
            .with_workspace(&workspace)
            .with_os_info();
        let mut context_builder = ContextBuilder::new().with_runtime_context(runtime);
        if let Some(prompt) = &settings.system_prompt {
            context_builder = context_builder.with_system_prompt(prompt);
        }

        Self {
            settings,
            provider,
            dispatcher: ToolDispatcher::new(Arc::new(registry), gate),
            context_builder,
            history: None,
            store: None,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Build an agent from configuration: provider by vendor, built-in tools,
    /// then whatever the configured MCP servers advertise.
    pub async fn from_config(config: &Config, gate: Arc<dyn PermissionGate>) -> Result<Self> {
        let provider = resolve_provider(config)?;
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, config);
        let remote = register_mcp_tools(&mut registry, &config.mcp.servers).await;
        info!(
            provider = provider.name(),
            tools = registry.len(),
            mcp_tools = remote.len(),
            "Agent configured"
        );
        Ok(Self::new(config.agent.clone(), provider, registry, gate))
    }

    /// Receive before/after snapshots from file-mutating tools.
    pub fn with_history(mut self, history: Arc<dyn FileHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Load and save sessions through `store` in [`AgentLoop::process`].
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_context_builder(mut self, context_builder: ContextBuilder) -> Self {
        self.context_builder = context_builder;
        self
    }

    pub fn settings(&self) -> &AgentDefaults {
        &self.settings
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub fn context_builder(&self) -> &ContextBuilder {
        &self.context_builder
    }

    /// Whether a turn (or summarization) is running for `session_id`.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.active
            .lock()
            .map(|set| set.contains(session_id))
            .unwrap_or(false)
    }

    fn options(&self) -> ChatOptions {
        ChatOptions::new()
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature)
    }

    fn tool_context(&self, session_id: &str, cancel: &CancellationToken, depth: usize) -> ToolContext {
        let workspace = self.settings.workspace_path();
        let mut ctx = ToolContext::new()
            .with_session(session_id)
            .with_workspace(&workspace.to_string_lossy())
            .with_cancel(cancel.clone())
            .with_depth(depth)
            .with_agent(self.clone());
        if let Some(history) = &self.history {
            ctx = ctx.with_history(Arc::clone(history));
        }
        ctx
    }

    /// Load (or create) a session from the store, run one turn, save it.
    ///
    /// The session is saved whatever the turn's outcome. The session's
    /// single-writer slot is held from load through save.
    pub async fn process(
        &self,
        session_id: &str,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| StewardError::Session("No session store configured".into()))?;

        let _turn = ActiveTurn::acquire(&self.active, session_id)?;
        let mut session = match store.load(session_id).await? {
            Some(session) => session,
            None => Session::new(session_id, &self.settings.model),
        };
        let span = info_span!("turn", session_id = %session.id, depth = 0usize);
        let outcome = self.drive(&mut session, input, cancel, 0).instrument(span).await;
        store.save(&session).await?;
        Ok(outcome)
    }

    /// Drop a session: its stored copy, if a store is configured, and every
    /// tool allowance granted within it. Fails while a turn is running on it.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        let _turn = ActiveTurn::acquire(&self.active, session_id)?;
        if let Some(store) = &self.store {
            store.delete(session_id).await?;
        }
        self.dispatcher.allowances().revoke_session(session_id);
        info!(session_id, "Session ended");
        Ok(())
    }

    /// Run one turn on `session`.
    ///
    /// Returns `Err` only when the turn cannot start because another turn is
    /// running on the same session. Every other ending is reported through
    /// [`TurnOutcome`].
    pub async fn run_turn(
        &self,
        session: &mut Session,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        self.run_turn_at_depth(session, input, cancel, 0).await
    }

    /// Run a turn on behalf of an agent `depth` levels up.
    pub(crate) async fn run_turn_at_depth(
        &self,
        session: &mut Session,
        input: &str,
        cancel: &CancellationToken,
        depth: usize,
    ) -> Result<TurnOutcome> {
        let _turn = ActiveTurn::acquire(&self.active, &session.id)?;
        let span = info_span!("turn", session_id = %session.id, depth);
        Ok(self.drive(session, input, cancel, depth).instrument(span).await)
    }

    async fn drive(
        &self,
        session: &mut Session,
        input: &str,
        cancel: &CancellationToken,
        depth: usize,
    ) -> TurnOutcome {
        let started = Instant::now();
        session.add_message(Message::user(input));
        session.set_status(TurnStatus::Running);
        info!("Turn started");

        let ctx = self.tool_context(&session.id, cancel, depth);
        let tools = self.registry().definitions();
        let max_iterations = self.settings.max_tool_iterations;
        let mut dispatched: HashSet<String> = HashSet::new();
        let mut iterations = 0;

        let outcome = loop {
            if cancel.is_cancelled() {
                break TurnOutcome::new(TurnEnd::Cancelled, String::new(), None, iterations);
            }
            if iterations >= max_iterations {
                warn!(max_iterations, "Tool iteration bound reached");
                break TurnOutcome::new(
                    TurnEnd::Errored,
                    String::new(),
                    Some(StewardError::MaxIterations(max_iterations)),
                    iterations,
                );
            }
            iterations += 1;
            debug!(iteration = iterations, max_iterations, "Calling provider");

            let request = self
                .context_builder
                .build_request(session, tools.clone(), self.options());
            let round = self.stream_round(session, request, cancel, &dispatched).await;

            let reason = match round.end {
                RoundEnd::Cancelled => {
                    append_partial(session, &round.text);
                    break TurnOutcome::new(TurnEnd::Cancelled, round.text, None, iterations);
                }
                RoundEnd::Failed(failure) => {
                    warn!(error = %failure, retryable = failure.retryable, "Provider call failed");
                    append_partial(session, &round.text);
                    break TurnOutcome::new(
                        TurnEnd::Errored,
                        round.text,
                        Some(failure.into_error()),
                        iterations,
                    );
                }
                RoundEnd::Completed(reason) => reason,
            };

            if round.calls.is_empty() {
                session.add_message(Message::assistant(&round.text));
                break TurnOutcome::new(TurnEnd::Completed, round.text, None, iterations);
            }

            append_partial(session, &round.text);
            debug!(?reason, calls = round.calls.len(), "Dispatching tool calls");

            for mut call in round.calls {
                if cancel.is_cancelled() {
                    break;
                }
                dispatched.insert(call.id.clone());
                let result = self.dispatcher.dispatch(&mut call, &ctx).await;
                session.add_message(Message::tool(call, result));
            }

            if cancel.is_cancelled() {
                break TurnOutcome::new(TurnEnd::Cancelled, round.text, None, iterations);
            }
        };

        session.set_status(match outcome.status {
            TurnEnd::Completed => TurnStatus::Idle,
            TurnEnd::Cancelled => TurnStatus::Cancelled,
            TurnEnd::Errored => TurnStatus::Errored,
        });
        let usage = session.usage();
        info!(
            status = ?outcome.status,
            iterations = outcome.iterations,
            latency_ms = started.elapsed().as_millis() as u64,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Turn finished"
        );
        outcome
    }

    /// Consume one provider stream. Usage is recorded on the session as it
    /// arrives; everything else is returned.
    async fn stream_round(
        &self,
        session: &mut Session,
        request: ChatRequest,
        cancel: &CancellationToken,
        dispatched: &HashSet<String>,
    ) -> Round {
        let mut stream = self.provider.stream(request, cancel.clone());
        let mut text = String::new();
        let mut calls: Vec<ToolCall> = Vec::new();
        let mut open: HashMap<String, ToolCall> = HashMap::new();

        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break RoundEnd::Cancelled,
                next = stream.next() => next,
            };

            let Some(event) = next else {
                if cancel.is_cancelled() {
                    break RoundEnd::Cancelled;
                }
                break RoundEnd::Failed(ProviderFailure::parse(
                    "provider stream ended before completion",
                ));
            };

            match event {
                ProviderEvent::TextDelta(delta) => text.push_str(&delta),
                ProviderEvent::ToolCallStart { id, name } => {
                    let duplicate = open.contains_key(&id)
                        || dispatched.contains(&id)
                        || calls.iter().any(|c| c.id == id);
                    if duplicate {
                        warn!(id = %id, tool = %name, "Ignoring duplicate tool call id");
                    } else {
                        open.insert(id.clone(), ToolCall::new(&id, &name, ""));
                    }
                }
                ProviderEvent::ToolCallArgDelta { id, fragment } => match open.get_mut(&id) {
                    Some(call) => call.raw_arguments.push_str(&fragment),
                    None => warn!(id = %id, "Argument fragment for unknown tool call"),
                },
                ProviderEvent::ToolCallEnd { id } => match open.remove(&id) {
                    Some(call) => calls.push(call),
                    None => warn!(id = %id, "End of unknown tool call"),
                },
                ProviderEvent::UsageReport(usage) => {
                    session.record_usage(usage.input_tokens, usage.output_tokens, usage.cost);
                }
                ProviderEvent::Reset { attempt } => {
                    info!(attempt, "Provider attempt restarted; discarding partial output");
                    text.clear();
                    calls.clear();
                    open.clear();
                }
                ProviderEvent::Completed(reason) => {
                    if !open.is_empty() {
                        warn!(count = open.len(), "Discarding tool calls that never ended");
                    }
                    break RoundEnd::Completed(reason);
                }
                ProviderEvent::Failed(failure) => break RoundEnd::Failed(failure),
            }
        };

        Round { text, calls, end }
    }

    /// Replace all but the `keep_recent` newest messages with a summary
    /// produced by a non-streaming provider call.
    ///
    /// Returns `Ok(false)` when the history is already short enough. Rejected
    /// with `TurnInProgress` while a turn is running on the session.
    pub async fn summarize(
        &self,
        session: &mut Session,
        keep_recent: usize,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let _turn = ActiveTurn::acquire(&self.active, &session.id)?;
        if !needs_summary(session.messages(), keep_recent) {
            return Ok(false);
        }

        let split = session.messages().len() - keep_recent;
        let prompt = build_summary_prompt(&session.messages()[..split]);
        let mut request = ChatRequest::new(vec![Message::user(&prompt)])
            .with_system(SUMMARY_SYSTEM_PROMPT)
            .with_options(self.options());
        if !session.model.is_empty() {
            request = request.with_model(&session.model);
        }

        let response = self.provider.complete(request, cancel.clone()).await?;
        if let Some(usage) = response.usage {
            session.record_usage(usage.input_tokens, usage.output_tokens, usage.cost);
        }

        let before = session.messages().len();
        let compacted = summarize_messages(session.messages().to_vec(), keep_recent, &response.content);
        session.replace_messages(compacted);
        info!(
            session_id = %session.id,
            before,
            after = session.messages().len(),
            "Summarized history"
        );
        Ok(true)
    }
}

/// Keep partial assistant output unless there is none.
fn append_partial(session: &mut Session, text: &str) {
    if !text.is_empty() {
        session.add_message(Message::assistant(text));
    }
}

impl std::fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("provider", &self.provider.name())
            .field("model", &self.settings.model)
            .field("tools", &self.registry().names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{FailureKind, ScriptedProvider, UsageReport};
    use crate::session::{Role, SessionManager, ToolCallStatus};
    use crate::tools::{AllowAllGate, EchoTool};
    use std::time::Duration;

    fn usage(input: u64, output: u64) -> UsageReport {
        UsageReport {
            input_tokens: input,
            output_tokens: output,
            cost: 0.0,
        }
    }

    fn agent(provider: ScriptedProvider) -> AgentLoop {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        AgentLoop::new(
            AgentDefaults::default(),
            Arc::new(provider),
            registry,
            Arc::new(AllowAllGate),
        )
    }

    #[tokio::test]
    async fn test_text_only_turn_appends_one_assistant_message() {
        let provider = ScriptedProvider::new(vec![ScriptedProvider::text_reply(
            &["Hel", "lo", "!"],
            usage(5, 2),
        )]);
        let agent = agent(provider);
        let mut session = Session::new("s", "m");

        let outcome = agent
            .run_turn(&mut session, "hi", &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.final_text, "Hello!");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role, Role::Assistant);
        assert_eq!(session.messages()[1].text(), "Hello!");
        assert_eq!(session.status(), TurnStatus::Idle);
        assert_eq!(session.usage().total_tokens(), 7);
        assert!(!agent.is_active("s"));
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let provider = ScriptedProvider::new(vec![
            ScriptedProvider::tool_reply(&[("c1", "echo", r#"{"message":"pong"}"#)], usage(3, 1)),
            ScriptedProvider::text_reply(&["Got pong."], usage(4, 2)),
        ]);
        let agent = agent(provider.clone());
        let mut session = Session::new("s", "m");

        let outcome = agent
            .run_turn(&mut session, "ping", &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.iterations, 2);
        let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Tool, Role::Assistant]);

        let tool_msg = &session.messages()[1];
        assert_eq!(tool_msg.tool_call().unwrap().status, ToolCallStatus::Completed);
        assert_eq!(tool_msg.tool_result().unwrap().content, "pong");

        // The second request carries the tool message back to the model.
        let second = &provider.requests()[1];
        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.messages[1].role, Role::Tool);
        assert_eq!(second.tools[0].name, "echo");
    }

    #[tokio::test]
    async fn test_reset_discards_partial_output() {
        let provider = ScriptedProvider::new(vec![vec![
            ProviderEvent::TextDelta("stale ".into()),
            ProviderEvent::ToolCallStart {
                id: "c1".into(),
                name: "echo".into(),
            },
            ProviderEvent::Reset { attempt: 1 },
            ProviderEvent::TextDelta("fresh".into()),
            ProviderEvent::Completed(FinishReason::EndTurn),
        ]]);
        let agent = agent(provider);
        let mut session = Session::new("s", "m");

        let outcome = agent
            .run_turn(&mut session, "hi", &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(session.last_assistant_text().as_deref(), Some("fresh"));
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_call_id_ignored() {
        let mut script = ScriptedProvider::tool_reply(
            &[
                ("dup", "echo", r#"{"message":"a"}"#),
                ("dup", "echo", r#"{"message":"b"}"#),
            ],
            usage(1, 1),
        );
        script.insert(0, ProviderEvent::TextDelta("checking".into()));
        let provider = ScriptedProvider::new(vec![
            script,
            ScriptedProvider::text_reply(&["done"], usage(1, 1)),
        ]);
        let agent = agent(provider);
        let mut session = Session::new("s", "m");

        agent
            .run_turn(&mut session, "go", &CancellationToken::new())
            .await
            .unwrap();

        let tool_msgs = session.messages_by_role(Role::Tool);
        assert_eq!(tool_msgs.len(), 1);
        assert_eq!(tool_msgs[0].tool_result().unwrap().content, "a");
        // Text of a tool round is kept as its own assistant message.
        assert_eq!(session.messages()[1].text(), "checking");
    }

    #[tokio::test]
    async fn test_max_iterations_errors() {
        let reply = || ScriptedProvider::tool_reply(&[("c", "echo", r#"{"message":"x"}"#)], usage(1, 1));
        let provider = ScriptedProvider::new(vec![]);
        for i in 0..3 {
            let mut script = reply();
            if let ProviderEvent::ToolCallStart { id, .. } = &mut script[0] {
                *id = format!("c{}", i);
            }
            if let ProviderEvent::ToolCallArgDelta { id, .. } = &mut script[1] {
                *id = format!("c{}", i);
            }
            if let ProviderEvent::ToolCallEnd { id } = &mut script[2] {
                *id = format!("c{}", i);
            }
            provider.push_script(script);
        }

        let settings = AgentDefaults {
            max_tool_iterations: 2,
            ..Default::default()
        };
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let agent = AgentLoop::new(settings, Arc::new(provider.clone()), registry, Arc::new(AllowAllGate));
        let mut session = Session::new("s", "m");

        let outcome = agent
            .run_turn(&mut session, "loop", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnEnd::Errored);
        assert!(matches!(outcome.error, Some(StewardError::MaxIterations(2))));
        assert_eq!(provider.calls(), 2);
        assert_eq!(session.messages_by_role(Role::Tool).len(), 2);
        assert_eq!(session.status(), TurnStatus::Errored);
    }

    #[tokio::test]
    async fn test_truncated_stream_is_errored_with_partial_text() {
        let provider = ScriptedProvider::new(vec![vec![ProviderEvent::TextDelta("half".into())]]);
        let agent = agent(provider);
        let mut session = Session::new("s", "m");

        let outcome = agent
            .run_turn(&mut session, "hi", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnEnd::Errored);
        match outcome.error {
            Some(StewardError::ProviderFailed(f)) => assert_eq!(f.kind, FailureKind::Parse),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(session.last_assistant_text().as_deref(), Some("half"));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream() {
        let provider = ScriptedProvider::new(vec![ScriptedProvider::text_reply(
            &["a", "b", "c", "d", "e"],
            usage(1, 1),
        )])
        .with_delay(Duration::from_millis(40));
        let agent = agent(provider);
        let mut session = Session::new("s", "m");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = agent.run_turn(&mut session, "hi", &cancel).await.unwrap();
        assert_eq!(outcome.status, TurnEnd::Cancelled);
        assert_eq!(session.status(), TurnStatus::Cancelled);
        assert!(session.messages_by_role(Role::Tool).is_empty());
        assert!(outcome.final_text.len() < 5);
        assert!(!outcome.final_text.is_empty());
        assert_eq!(
            session.last_assistant_text().as_deref(),
            Some(outcome.final_text.as_str())
        );
    }

    #[tokio::test]
    async fn test_concurrent_turn_rejected() {
        let provider = ScriptedProvider::new(vec![ScriptedProvider::text_reply(
            &["slow", "reply"],
            usage(1, 1),
        )])
        .with_delay(Duration::from_millis(100));
        let agent = agent(provider);

        let first_agent = agent.clone();
        let first = tokio::spawn(async move {
            let mut session = Session::new("shared", "m");
            first_agent
                .run_turn(&mut session, "one", &CancellationToken::new())
                .await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(agent.is_active("shared"));
        let mut again = Session::new("shared", "m");
        let err = agent
            .run_turn(&mut again, "two", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StewardError::TurnInProgress(_)));
        assert!(again.messages().is_empty());

        let outcome = first.await.unwrap().unwrap();
        assert!(outcome.is_completed());
        assert!(!agent.is_active("shared"));
    }

    #[tokio::test]
    async fn test_summarize_replaces_older_history() {
        let provider = ScriptedProvider::new(vec![ScriptedProvider::text_reply(
            &["User greeted twice."],
            usage(20, 5),
        )]);
        let agent = agent(provider.clone());
        let mut session = Session::new("s", "m");
        for text in ["hi", "hello", "hey", "yo"] {
            session.add_message(Message::user(text));
        }

        let changed = agent
            .summarize(&mut session, 2, &CancellationToken::new())
            .await
            .unwrap();

        assert!(changed);
        assert_eq!(session.messages().len(), 3);
        assert_eq!(
            session.messages()[0].text(),
            "[Conversation Summary]\nUser greeted twice."
        );
        assert_eq!(session.messages()[1].text(), "hey");
        assert_eq!(session.usage().input_tokens, 20);

        let request = &provider.requests()[0];
        assert!(request.tools.is_empty());
        assert!(request.messages[0].text().contains("user: hello"));
        assert!(!request.messages[0].text().contains("user: hey"));
    }

    #[tokio::test]
    async fn test_summarize_noop_for_short_history() {
        let provider = ScriptedProvider::default();
        let agent = agent(provider.clone());
        let mut session = Session::new("s", "m");
        session.add_message(Message::user("only"));

        let changed = agent
            .summarize(&mut session, 4, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_process_loads_and_saves() {
        let provider = ScriptedProvider::new(vec![
            ScriptedProvider::text_reply(&["first"], usage(1, 1)),
            ScriptedProvider::text_reply(&["second"], usage(1, 1)),
        ]);
        let store = SessionManager::new_memory();
        let agent = agent(provider).with_store(Arc::new(store.clone()));
        let cancel = CancellationToken::new();

        agent.process("chat", "one", &cancel).await.unwrap();
        agent.process("chat", "two", &cancel).await.unwrap();

        let session = store.load("chat").await.unwrap().unwrap();
        assert_eq!(session.messages().len(), 4);
        assert_eq!(session.title.as_deref(), Some("one"));
        assert_eq!(session.last_assistant_text().as_deref(), Some("second"));
    }

    /// Store whose saves take a while, widening the gap between a turn
    /// ending and its session reaching the store.
    #[derive(Clone)]
    struct SlowSaveStore {
        inner: SessionManager,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl SessionStore for SlowSaveStore {
        async fn load(&self, id: &str) -> Result<Option<Session>> {
            self.inner.load(id).await
        }
        async fn save(&self, session: &Session) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.save(session).await
        }
        async fn delete(&self, id: &str) -> Result<()> {
            self.inner.delete(id).await
        }
        async fn list(&self) -> Result<Vec<String>> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_process_holds_session_until_saved() {
        let provider = ScriptedProvider::new(vec![
            ScriptedProvider::text_reply(&["first"], usage(1, 1)),
            ScriptedProvider::text_reply(&["second"], usage(1, 1)),
        ]);
        let inner = SessionManager::new_memory();
        let store = SlowSaveStore {
            inner: inner.clone(),
            delay: Duration::from_millis(150),
        };
        let agent = agent(provider.clone()).with_store(Arc::new(store));

        let first_agent = agent.clone();
        let first = tokio::spawn(async move {
            first_agent
                .process("chat", "one", &CancellationToken::new())
                .await
        });

        // The first turn has finished streaming and is now saving.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(agent.is_active("chat"));
        let err = agent
            .process("chat", "two", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StewardError::TurnInProgress(_)));
        assert_eq!(provider.calls(), 1);

        assert!(first.await.unwrap().unwrap().is_completed());
        assert!(!agent.is_active("chat"));

        agent
            .process("chat", "two", &CancellationToken::new())
            .await
            .unwrap();
        let session = inner.load("chat").await.unwrap().unwrap();
        assert_eq!(session.messages().len(), 4);
        assert_eq!(session.last_assistant_text().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_end_session_forgets_store_and_allowances() {
        let provider = ScriptedProvider::new(vec![ScriptedProvider::text_reply(
            &["hi"],
            usage(1, 1),
        )]);
        let store = SessionManager::new_memory();
        let agent = agent(provider).with_store(Arc::new(store.clone()));
        agent
            .process("chat", "one", &CancellationToken::new())
            .await
            .unwrap();
        agent.dispatcher().allowances().grant("chat", "shell");

        agent.end_session("chat").await.unwrap();

        assert!(store.load("chat").await.unwrap().is_none());
        assert!(!agent.dispatcher().allowances().is_allowed("chat", "shell"));
    }

    #[tokio::test]
    async fn test_process_without_store_fails() {
        let agent = agent(ScriptedProvider::default());
        let err = agent
            .process("chat", "one", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StewardError::Session(_)));
    }
}
