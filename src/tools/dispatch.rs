//! Tool dispatch.
//!
//! [`ToolDispatcher`] runs a single [`ToolCall`] through
//! lookup, argument parsing, schema validation, the permission gate and
//! execution. Every failure along the way becomes a failed [`ToolResult`]
//! for the model; dispatch itself never errors. Waiting on the gate and on
//! the tool both race the context's cancellation token.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::session::{ToolCall, ToolCallStatus, ToolResult};

use super::permission::{PermissionDecision, PermissionGate, SessionPermissions};
use super::{schema, ToolContext, ToolRegistry};

/// Runs tool calls against a registry, gated by a [`PermissionGate`].
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    gate: Arc<dyn PermissionGate>,
    allowances: Arc<SessionPermissions>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, gate: Arc<dyn PermissionGate>) -> Self {
        Self {
            registry,
            gate,
            allowances: Arc::new(SessionPermissions::new()),
        }
    }

    /// Share session allowances with another dispatcher.
    pub fn with_allowances(mut self, allowances: Arc<SessionPermissions>) -> Self {
        self.allowances = allowances;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn gate(&self) -> &Arc<dyn PermissionGate> {
        &self.gate
    }

    pub fn allowances(&self) -> &Arc<SessionPermissions> {
        &self.allowances
    }

    /// Run one call to a terminal status and return its result.
    ///
    /// `call.status` moves through `PermissionWait` and `Running` and ends as
    /// `Completed`, `Failed` or `Cancelled`.
    pub async fn dispatch(&self, call: &mut ToolCall, ctx: &ToolContext) -> ToolResult {
        let start = Instant::now();
        let result = self.run(call, ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match call.status {
            ToolCallStatus::Completed => {
                info!(tool = %call.name, id = %call.id, duration_ms, "Tool completed")
            }
            ToolCallStatus::Cancelled => {
                info!(tool = %call.name, id = %call.id, duration_ms, "Tool cancelled")
            }
            _ => warn!(
                tool = %call.name,
                id = %call.id,
                duration_ms,
                error = %result.content,
                "Tool failed"
            ),
        }
        result
    }

    async fn run(&self, call: &mut ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name) else {
            return fail(call, format!("Tool not found: {}", call.name));
        };

        let args = match call.arguments() {
            Ok(args) => args,
            Err(e) => {
                return fail(
                    call,
                    format!("Invalid arguments for {}: malformed JSON ({})", call.name, e),
                )
            }
        };
        if let Err(errors) = schema::validate(&tool.parameters(), &args) {
            return fail(
                call,
                format!("Invalid arguments for {}: {}", call.name, errors.join("; ")),
            );
        }

        if tool.is_sensitive() && !self.allowances.is_allowed(&ctx.session_id, &call.name) {
            call.status = ToolCallStatus::PermissionWait;
            let description = tool.describe_action(&args);
            let name = call.name.clone();
            debug!(tool = %name, action = %description, "Requesting permission");

            let decision = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                d = self.gate.request(&name, &description, &ctx.session_id) => Some(d),
            };

            match decision {
                None => return cancel(call, "Cancelled while awaiting permission"),
                Some(Ok(PermissionDecision::Allow)) => {}
                Some(Ok(PermissionDecision::AllowForSession)) => {
                    self.allowances.grant(&ctx.session_id, &name);
                }
                Some(Ok(PermissionDecision::Deny)) => {
                    return fail(call, format!("Permission denied: {}", description));
                }
                Some(Err(e)) => {
                    return fail(call, format!("Permission denied (gate error: {})", e));
                }
            }
        }

        if ctx.cancel.is_cancelled() {
            return cancel(call, "Tool execution cancelled");
        }

        call.status = ToolCallStatus::Running;
        info!(tool = %call.name, id = %call.id, "Executing tool");

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            outcome = tool.execute(args, ctx) => Some(outcome),
        };

        let Some(outcome) = outcome else {
            return cancel(call, "Tool execution cancelled");
        };
        match outcome {
            Ok(output) if output.is_error => fail(call, output.content),
            Ok(output) => {
                call.status = ToolCallStatus::Completed;
                ToolResult::success(&call.id, output.content)
            }
            Err(e) => fail(call, format!("Error: {}", e)),
        }
    }
}

fn fail(call: &mut ToolCall, message: String) -> ToolResult {
    call.status = ToolCallStatus::Failed;
    ToolResult::error(&call.id, message)
}

fn cancel(call: &mut ToolCall, message: &str) -> ToolResult {
    call.status = ToolCallStatus::Cancelled;
    ToolResult::error(&call.id, message)
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::permission::{MockPermissionGate, ScriptedGate};
    use crate::tools::{EchoTool, Tool, ToolCategory, ToolOutput, WriteFileTool};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps for a long time"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::FilesystemRead
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> crate::error::Result<ToolOutput> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ToolOutput::success("woke up"))
        }
    }

    fn dispatcher(gate: Arc<dyn PermissionGate>) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(SlowTool));
        ToolDispatcher::new(Arc::new(registry), gate)
    }

    fn never_asked() -> Arc<dyn PermissionGate> {
        let mut gate = MockPermissionGate::new();
        gate.expect_request().never();
        Arc::new(gate)
    }

    #[tokio::test]
    async fn test_unknown_tool_fails() {
        let d = dispatcher(never_asked());
        let mut call = ToolCall::new("c1", "nope", "{}");
        let result = d.dispatch(&mut call, &ToolContext::new()).await;

        assert_eq!(call.status, ToolCallStatus::Failed);
        assert!(result.is_error);
        assert_eq!(result.content, "Tool not found: nope");
        assert_eq!(result.call_id, "c1");
    }

    #[tokio::test]
    async fn test_non_sensitive_tool_skips_gate() {
        let d = dispatcher(never_asked());
        let mut call = ToolCall::new("c1", "echo", r#"{"message":"hi"}"#);
        let result = d.dispatch(&mut call, &ToolContext::new()).await;

        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(result.content, "hi");
    }

    #[tokio::test]
    async fn test_malformed_json_fails_before_gate() {
        let d = dispatcher(never_asked());
        let mut call = ToolCall::new("c1", "write_file", "{not json");
        let result = d.dispatch(&mut call, &ToolContext::new()).await;

        assert_eq!(call.status, ToolCallStatus::Failed);
        assert!(result.content.starts_with("Invalid arguments for write_file"));
    }

    #[tokio::test]
    async fn test_schema_violation_fails_before_gate() {
        let d = dispatcher(never_asked());
        let mut call = ToolCall::new("c1", "write_file", r#"{"path": 7}"#);
        let result = d.dispatch(&mut call, &ToolContext::new()).await;

        assert_eq!(call.status, ToolCallStatus::Failed);
        assert!(result.content.contains("$.path: expected string, got integer"));
        assert!(result
            .content
            .contains("$: missing required property 'content'"));
    }

    #[tokio::test]
    async fn test_deny_never_executes() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().canonicalize().unwrap();
        let ctx = ToolContext::new()
            .with_session("s1")
            .with_workspace(ws.to_str().unwrap());

        let mut gate = MockPermissionGate::new();
        gate.expect_request()
            .withf(|tool, description, session| {
                tool == "write_file" && description == "Write 2 bytes to a.txt" && session == "s1"
            })
            .times(1)
            .returning(|_, _, _| Ok(PermissionDecision::Deny));
        let d = dispatcher(Arc::new(gate));

        let mut call = ToolCall::new("c1", "write_file", r#"{"path":"a.txt","content":"hi"}"#);
        let result = d.dispatch(&mut call, &ctx).await;

        assert_eq!(call.status, ToolCallStatus::Failed);
        assert!(result.content.starts_with("Permission denied"));
        assert!(!ws.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_gate_error_is_denial() {
        let mut gate = MockPermissionGate::new();
        gate.expect_request()
            .returning(|_, _, _| Err(crate::error::StewardError::PermissionDenied("no ui".into())));
        let d = dispatcher(Arc::new(gate));

        let mut call = ToolCall::new("c1", "write_file", r#"{"path":"a","content":""}"#);
        let result = d.dispatch(&mut call, &ToolContext::new()).await;
        assert_eq!(call.status, ToolCallStatus::Failed);
        assert!(result.content.starts_with("Permission denied"));
    }

    #[tokio::test]
    async fn test_allow_for_session_skips_gate_next_time() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().canonicalize().unwrap();
        let ctx = ToolContext::new()
            .with_session("s1")
            .with_workspace(ws.to_str().unwrap());

        let gate = Arc::new(ScriptedGate::new(vec![PermissionDecision::AllowForSession]));
        let d = dispatcher(gate.clone());

        for i in 0..3 {
            let args = format!(r#"{{"path":"f{}.txt","content":"x"}}"#, i);
            let mut call = ToolCall::new(&format!("c{}", i), "write_file", &args);
            let result = d.dispatch(&mut call, &ctx).await;
            assert!(!result.is_error, "{}", result.content);
        }
        assert_eq!(gate.requests().len(), 1);

        // Another session still has to ask.
        let other = ctx.clone().with_session("s2");
        let mut call = ToolCall::new("c9", "write_file", r#"{"path":"g.txt","content":"x"}"#);
        d.dispatch(&mut call, &other).await;
        assert_eq!(gate.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_tool() {
        let d = dispatcher(never_asked());
        let cancel = CancellationToken::new();
        let ctx = ToolContext::new().with_cancel(cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut call = ToolCall::new("c1", "slow", "{}");
        let start = Instant::now();
        let result = d.dispatch(&mut call, &ctx).await;

        assert_eq!(call.status, ToolCallStatus::Cancelled);
        assert!(result.is_error);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_starts() {
        let d = dispatcher(never_asked());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = ToolContext::new().with_cancel(cancel);

        let mut call = ToolCall::new("c1", "echo", r#"{"message":"hi"}"#);
        d.dispatch(&mut call, &ctx).await;
        assert_eq!(call.status, ToolCallStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_tool_error_output_marks_failed() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(WriteFileTool));
        let d = ToolDispatcher::new(Arc::new(registry), Arc::new(ScriptedGate::new(vec![])));

        // No workspace: the tool itself returns an error.
        let mut call = ToolCall::new("c1", "write_file", r#"{"path":"a","content":"b"}"#);
        let result = d.dispatch(&mut call, &ToolContext::new()).await;
        assert_eq!(call.status, ToolCallStatus::Failed);
        assert!(result.content.starts_with("Error: "));
    }
}
