//! Agent delegation tool.
//!
//! The `DelegateTool` runs a nested turn of the calling agent in a fresh,
//! isolated session with a role-specific system prompt. The nested turn shares
//! the caller's provider, tool registry and permission gate, and its final
//! answer becomes the tool result.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::agent::TurnEnd;
use crate::error::{Result, StewardError};
use crate::session::Session;

use super::{Tool, ToolCategory, ToolContext, ToolOutput};

/// Default role when the model does not name one.
const DEFAULT_ROLE: &str = "assistant";

/// Tool to delegate a task to a specialist sub-agent.
///
/// Nesting is bounded by `max_depth`: a call made at depth `d` starts a turn
/// at depth `d + 1` and is refused when that exceeds the bound.
pub struct DelegateTool {
    max_depth: u32,
}

impl DelegateTool {
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    fn role_prompt(role: &str) -> String {
        format!(
            "You are a specialist with the role: {}. \
             Complete the task given to you thoroughly and return your findings \
             as your final answer.",
            role
        )
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate"
    }

    fn description(&self) -> &str {
        "Delegate a task to a specialist sub-agent with a specific role. \
         The sub-agent runs to completion with the same tools and returns its result. \
         Use this to decompose complex tasks into specialist subtasks."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task for the sub-agent to complete"
                },
                "role": {
                    "type": "string",
                    "description": "The specialist role (e.g., 'researcher', 'reviewer')"
                }
            },
            "required": ["task"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Agent
    }

    fn describe_action(&self, args: &Value) -> String {
        let role = args.get("role").and_then(Value::as_str).unwrap_or(DEFAULT_ROLE);
        format!("Delegate a task to a '{}' sub-agent", role)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let task = args
            .get("task")
            .and_then(Value::as_str)
            .ok_or_else(|| StewardError::Tool("Missing 'task' argument".into()))?;
        let role = args.get("role").and_then(Value::as_str).unwrap_or(DEFAULT_ROLE);

        let depth = ctx.depth + 1;
        if depth > self.max_depth as usize {
            return Err(StewardError::Tool(format!(
                "Delegation depth limit reached ({})",
                self.max_depth
            )));
        }

        let agent = ctx
            .agent
            .as_ref()
            .ok_or_else(|| StewardError::Tool("No agent available for delegation".into()))?;

        let builder = agent
            .context_builder()
            .clone()
            .with_system_prompt(&Self::role_prompt(role));
        let sub_agent = agent.clone().with_context_builder(builder);
        let mut session = Session::generate(&agent.settings().model);

        info!(role = %role, depth, session_id = %session.id, "Delegating task to sub-agent");
        let outcome = sub_agent
            .run_turn_at_depth(&mut session, task, &ctx.cancel.child_token(), depth)
            .await;
        // The nested session is throwaway; so are its allowances.
        agent.dispatcher().allowances().revoke_session(&session.id);
        let outcome = outcome?;

        match outcome.status {
            TurnEnd::Completed => {
                info!(role = %role, result_len = outcome.final_text.len(), "Sub-agent completed");
                Ok(ToolOutput::success(outcome.final_text))
            }
            TurnEnd::Cancelled => Ok(ToolOutput::error("Delegated task was cancelled")),
            TurnEnd::Errored => {
                let cause = outcome
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                warn!(role = %role, error = %cause, "Sub-agent failed");
                Ok(ToolOutput::error(format!("Sub-agent '{}' failed: {}", role, cause)))
            }
        }
    }
}
