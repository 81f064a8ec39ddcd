//! Normalized provider streaming events.
//!
//! Every vendor client translates its wire frames into this one event
//! vocabulary. A stream is consumed once, in emission order, and ends after
//! `Completed` or `Failed` (or silently when the caller cancels).

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, StewardError};

/// A lazy, finite sequence of provider events.
pub type ProviderStream = Pin<Box<dyn Stream<Item = ProviderEvent> + Send>>;

/// One normalized event from a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// A fragment of assistant text.
    TextDelta(String),
    /// The model started a tool call.
    ToolCallStart { id: String, name: String },
    /// A fragment of a tool call's JSON arguments.
    ToolCallArgDelta { id: String, fragment: String },
    /// The tool call's arguments are complete.
    ToolCallEnd { id: String },
    /// Tokens consumed by this call (a delta, not a running total).
    UsageReport(UsageReport),
    /// The model finished normally.
    Completed(FinishReason),
    /// The call failed. Terminal.
    Failed(ProviderFailure),
    /// A retryable failure interrupted an attempt that had already emitted
    /// events. Everything accumulated since the previous `Reset` (or the start
    /// of the call) must be discarded; a fresh attempt follows.
    Reset { attempt: u32 },
}

impl ProviderEvent {
    /// `Completed` and `Failed` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProviderEvent::Completed(_) | ProviderEvent::Failed(_))
    }
}

/// Token usage and cost for one provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Cost in USD derived from the configured per-token pricing
    pub cost: f64,
}

/// Why the model stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl FinishReason {
    /// Map a vendor stop reason (Anthropic `stop_reason` or OpenAI
    /// `finish_reason`) onto the normalized set.
    pub fn from_vendor(reason: &str) -> Self {
        match reason {
            "end_turn" | "stop" => FinishReason::EndTurn,
            "tool_use" | "tool_calls" | "function_call" => FinishReason::ToolUse,
            "max_tokens" | "length" => FinishReason::MaxTokens,
            "stop_sequence" => FinishReason::StopSequence,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// Coarse failure classification carried by `Failed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimit,
    Overloaded,
    Server,
    Timeout,
    Network,
    Auth,
    Billing,
    InvalidRequest,
    ModelNotFound,
    Parse,
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::RateLimit => "rate_limit",
            FailureKind::Overloaded => "overloaded",
            FailureKind::Server => "server",
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network",
            FailureKind::Auth => "auth",
            FailureKind::Billing => "billing",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::ModelNotFound => "model_not_found",
            FailureKind::Parse => "parse",
            FailureKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Payload of a `Failed` event.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
}

impl ProviderFailure {
    /// A failure whose retryability follows its classification.
    pub fn classified(err: ProviderError) -> Self {
        Self {
            kind: err.kind(),
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }

    /// A malformed vendor response. Never retried.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::classified(ProviderError::Parse(message.into()))
    }

    /// The same failure, no longer eligible for retry.
    pub fn exhausted(mut self, attempts: u32) -> Self {
        self.message = format!("{} (retries exhausted after {} attempts)", self.message, attempts);
        self.retryable = false;
        self
    }

    /// Classify a transport error from the HTTP client.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let classified = if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            ProviderError::Network(err.to_string())
        } else {
            ProviderError::Unknown(err.to_string())
        };
        Self::classified(classified)
    }

    /// The classified provider error for this failure.
    pub fn to_provider_error(&self) -> ProviderError {
        ProviderError::from_kind(self.kind, self.message.clone())
    }

    /// Convert into the crate error. Retryability is preserved as reported,
    /// so an exhausted transient failure stays fatal.
    pub fn into_error(self) -> StewardError {
        StewardError::ProviderFailed(self)
    }
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_vendor("end_turn"), FinishReason::EndTurn);
        assert_eq!(FinishReason::from_vendor("stop"), FinishReason::EndTurn);
        assert_eq!(FinishReason::from_vendor("tool_calls"), FinishReason::ToolUse);
        assert_eq!(FinishReason::from_vendor("length"), FinishReason::MaxTokens);
        assert_eq!(
            FinishReason::from_vendor("content_filter"),
            FinishReason::Other("content_filter".to_string())
        );
    }

    #[test]
    fn test_terminal_events() {
        assert!(ProviderEvent::Completed(FinishReason::EndTurn).is_terminal());
        assert!(ProviderEvent::Failed(ProviderFailure::parse("bad")).is_terminal());
        assert!(!ProviderEvent::TextDelta("x".into()).is_terminal());
        assert!(!ProviderEvent::Reset { attempt: 1 }.is_terminal());
    }

    #[test]
    fn test_classified_failure_retryability() {
        let f = ProviderFailure::classified(ProviderError::RateLimit("429".into()));
        assert_eq!(f.kind, FailureKind::RateLimit);
        assert!(f.retryable);

        let f = ProviderFailure::classified(ProviderError::Auth("401".into()));
        assert!(!f.retryable);
    }

    #[test]
    fn test_exhausted_is_not_retryable() {
        let f = ProviderFailure::classified(ProviderError::ServerError("500".into())).exhausted(4);
        assert!(!f.retryable);
        assert_eq!(f.kind, FailureKind::Server);
        assert!(f.message.contains("retries exhausted"));
    }

    #[test]
    fn test_into_error_keeps_kind_and_fatality() {
        let failure =
            ProviderFailure::classified(ProviderError::Timeout("slow".into())).exhausted(2);
        assert_eq!(failure.to_provider_error().kind(), FailureKind::Timeout);

        let err = failure.into_error();
        assert!(!err.is_retryable());
        match err {
            StewardError::ProviderFailed(f) => assert_eq!(f.kind, FailureKind::Timeout),
            other => panic!("unexpected error: {other}"),
        }
    }
}
