//! Permission gating for sensitive tools.
//!
//! Before a sensitive tool runs, the dispatcher asks a [`PermissionGate`] for
//! a decision. The gate may suspend (e.g. while a human answers a prompt); the
//! dispatcher races it against the turn's cancellation token.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    /// Run this call once.
    Allow,
    /// Run this call and skip the gate for the same tool for the rest of the
    /// session.
    AllowForSession,
    /// Do not run the call.
    Deny,
}

impl PermissionDecision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, PermissionDecision::Deny)
    }
}

/// Authorizes sensitive tool executions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Decide whether `tool` may perform `description` in `session_id`.
    async fn request(
        &self,
        tool: &str,
        description: &str,
        session_id: &str,
    ) -> Result<PermissionDecision>;
}

/// Gate that allows everything. For trusted, unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllGate;

#[async_trait]
impl PermissionGate for AllowAllGate {
    async fn request(&self, _: &str, _: &str, _: &str) -> Result<PermissionDecision> {
        Ok(PermissionDecision::Allow)
    }
}

/// Gate that denies everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllGate;

#[async_trait]
impl PermissionGate for DenyAllGate {
    async fn request(&self, _: &str, _: &str, _: &str) -> Result<PermissionDecision> {
        Ok(PermissionDecision::Deny)
    }
}

/// A permission request as seen by a [`ScriptedGate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub tool: String,
    pub description: String,
    pub session_id: String,
}

/// Gate that answers from a queue of decisions, then falls back to a default.
///
/// Every request is recorded, which makes it handy for replays and tests.
///
/// # Example
/// ```
/// use steward::tools::{PermissionDecision, PermissionGate, ScriptedGate};
///
/// # tokio_test::block_on(async {
/// let gate = ScriptedGate::new(vec![PermissionDecision::Deny]);
/// assert_eq!(gate.request("shell", "ls", "s").await.unwrap(), PermissionDecision::Deny);
/// assert_eq!(gate.request("shell", "ls", "s").await.unwrap(), PermissionDecision::Allow);
/// assert_eq!(gate.requests().len(), 2);
/// # });
/// ```
#[derive(Debug)]
pub struct ScriptedGate {
    decisions: Mutex<VecDeque<PermissionDecision>>,
    fallback: PermissionDecision,
    requests: Mutex<Vec<PermissionRequest>>,
}

impl ScriptedGate {
    /// Answer with `decisions` in order, then `Allow`.
    pub fn new(decisions: Vec<PermissionDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            fallback: PermissionDecision::Allow,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Decision used once the queue is empty.
    pub fn with_fallback(mut self, fallback: PermissionDecision) -> Self {
        self.fallback = fallback;
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<PermissionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PermissionGate for ScriptedGate {
    async fn request(
        &self,
        tool: &str,
        description: &str,
        session_id: &str,
    ) -> Result<PermissionDecision> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(PermissionRequest {
                tool: tool.to_string(),
                description: description.to_string(),
                session_id: session_id.to_string(),
            });
        }
        let next = self
            .decisions
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        Ok(next.unwrap_or(self.fallback))
    }
}

/// Tools granted `AllowForSession`, keyed by session id.
///
/// Grants live until revoked. [`AgentLoop::end_session`](crate::agent::AgentLoop::end_session)
/// revokes them for top-level sessions; delegated sessions are revoked when
/// their nested turn returns.
#[derive(Debug, Default)]
pub struct SessionPermissions {
    granted: Mutex<HashMap<String, HashSet<String>>>,
}

impl SessionPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_allowed(&self, session_id: &str, tool: &str) -> bool {
        self.granted
            .lock()
            .map(|g| g.get(session_id).is_some_and(|tools| tools.contains(tool)))
            .unwrap_or(false)
    }

    pub fn grant(&self, session_id: &str, tool: &str) {
        if let Ok(mut granted) = self.granted.lock() {
            granted
                .entry(session_id.to_string())
                .or_default()
                .insert(tool.to_string());
        }
    }

    /// Forget every allowance of one session.
    pub fn revoke_session(&self, session_id: &str) {
        if let Ok(mut granted) = self.granted.lock() {
            granted.remove(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_gates() {
        assert_eq!(
            AllowAllGate.request("shell", "ls", "s").await.unwrap(),
            PermissionDecision::Allow
        );
        assert_eq!(
            DenyAllGate.request("shell", "ls", "s").await.unwrap(),
            PermissionDecision::Deny
        );
    }

    #[tokio::test]
    async fn test_scripted_gate_queue_then_fallback() {
        let gate = ScriptedGate::new(vec![PermissionDecision::AllowForSession])
            .with_fallback(PermissionDecision::Deny);

        let first = gate.request("write_file", "Write 3 bytes to a", "s1").await;
        assert_eq!(first.unwrap(), PermissionDecision::AllowForSession);
        let second = gate.request("write_file", "Write 3 bytes to b", "s1").await;
        assert_eq!(second.unwrap(), PermissionDecision::Deny);

        let requests = gate.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].description, "Write 3 bytes to b");
        assert_eq!(requests[0].session_id, "s1");
    }

    #[test]
    fn test_session_permissions_are_per_session_and_tool() {
        let perms = SessionPermissions::new();
        perms.grant("s1", "shell");

        assert!(perms.is_allowed("s1", "shell"));
        assert!(!perms.is_allowed("s1", "delete_file"));
        assert!(!perms.is_allowed("s2", "shell"));

        perms.revoke_session("s1");
        assert!(!perms.is_allowed("s1", "shell"));
    }

    #[test]
    fn test_decision_is_allowed() {
        assert!(PermissionDecision::Allow.is_allowed());
        assert!(PermissionDecision::AllowForSession.is_allowed());
        assert!(!PermissionDecision::Deny.is_allowed());
    }
}
