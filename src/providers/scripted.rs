//! Scripted provider for tests and offline runs.
//!
//! Each call to [`LLMProvider::stream`] pops the next script (a list of events)
//! and replays it, optionally pausing before every event. Requests are
//! recorded so callers can assert on what was sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::event::{FinishReason, ProviderEvent, ProviderFailure, ProviderStream, UsageReport};
use super::sse::cancellable;
use super::{ChatRequest, LLMProvider};

/// A provider that replays canned event sequences.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    scripts: Arc<Mutex<VecDeque<Vec<ProviderEvent>>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    /// Create a provider that serves `scripts` in order, one per call.
    pub fn new(scripts: Vec<Vec<ProviderEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            ..Default::default()
        }
    }

    /// Pause before yielding each event.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append another script to the queue.
    pub fn push_script(&self, script: Vec<ProviderEvent>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(script);
        }
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Scripts not yet consumed.
    pub fn remaining(&self) -> usize {
        self.scripts.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// A complete text reply: one delta per chunk, then usage and `EndTurn`.
    pub fn text_reply(chunks: &[&str], usage: UsageReport) -> Vec<ProviderEvent> {
        let mut events: Vec<ProviderEvent> = chunks
            .iter()
            .map(|c| ProviderEvent::TextDelta(c.to_string()))
            .collect();
        events.push(ProviderEvent::UsageReport(usage));
        events.push(ProviderEvent::Completed(FinishReason::EndTurn));
        events
    }

    /// A reply requesting the given tool calls `(id, name, arguments)`.
    pub fn tool_reply(calls: &[(&str, &str, &str)], usage: UsageReport) -> Vec<ProviderEvent> {
        let mut events = Vec::new();
        for (id, name, arguments) in calls {
            events.push(ProviderEvent::ToolCallStart {
                id: id.to_string(),
                name: name.to_string(),
            });
            if !arguments.is_empty() {
                events.push(ProviderEvent::ToolCallArgDelta {
                    id: id.to_string(),
                    fragment: arguments.to_string(),
                });
            }
            events.push(ProviderEvent::ToolCallEnd { id: id.to_string() });
        }
        events.push(ProviderEvent::UsageReport(usage));
        events.push(ProviderEvent::Completed(FinishReason::ToolUse));
        events
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    fn stream(&self, request: ChatRequest, cancel: CancellationToken) -> ProviderStream {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| {
                vec![ProviderEvent::Failed(ProviderFailure::parse(
                    "scripted provider has no response left",
                ))]
            });

        let delay = self.delay;
        let events = futures::stream::iter(script).then(move |event| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            event
        });
        cancellable(events.boxed(), cancel)
    }
}
