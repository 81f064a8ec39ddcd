//! Error types for Steward
//!
//! This module defines all error types used throughout the crate.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;
use thiserror::Error;

use crate::providers::{FailureKind, ProviderFailure};

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
///
/// Provides fine-grained categorization of LLM provider failures,
/// enabling retry decisions without string matching.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// 401/403: Invalid API key or authentication failure
    Auth(String),
    /// 429: Rate limit exceeded
    RateLimit(String),
    /// 402: Payment required or quota exhausted
    Billing(String),
    /// 500/502/504: Server-side errors
    ServerError(String),
    /// 400: Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404: Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Connection refused, reset, DNS failure
    Network(String),
    /// Provider is overloaded (e.g. Anthropic `overloaded_error`, HTTP 503/529)
    Overloaded(String),
    /// Request format error (e.g. malformed tool_use.id); never retried
    Format(String),
    /// Vendor response could not be decoded
    Parse(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Network(msg) => write!(f, "Network error: {}", msg),
            ProviderError::Overloaded(msg) => write!(f, "Overloaded error: {}", msg),
            ProviderError::Format(msg) => write!(f, "Format error: {}", msg),
            ProviderError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if this error is transient and the request should be retried.
    ///
    /// Retryable errors: RateLimit, ServerError, Timeout, Network, Overloaded.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_)
                | ProviderError::ServerError(_)
                | ProviderError::Timeout(_)
                | ProviderError::Network(_)
                | ProviderError::Overloaded(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::Billing(_) => Some(402),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Overloaded(_) => Some(503),
            ProviderError::Format(_) => Some(400),
            ProviderError::Timeout(_)
            | ProviderError::Network(_)
            | ProviderError::Parse(_)
            | ProviderError::Unknown(_) => None,
        }
    }

    /// The event-level failure kind for this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Auth(_) => FailureKind::Auth,
            ProviderError::RateLimit(_) => FailureKind::RateLimit,
            ProviderError::Billing(_) => FailureKind::Billing,
            ProviderError::ServerError(_) => FailureKind::Server,
            ProviderError::InvalidRequest(_) | ProviderError::Format(_) => {
                FailureKind::InvalidRequest
            }
            ProviderError::ModelNotFound(_) => FailureKind::ModelNotFound,
            ProviderError::Timeout(_) => FailureKind::Timeout,
            ProviderError::Network(_) => FailureKind::Network,
            ProviderError::Overloaded(_) => FailureKind::Overloaded,
            ProviderError::Parse(_) => FailureKind::Parse,
            ProviderError::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// Rebuild a classified error from an event-level failure kind.
    pub fn from_kind(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            FailureKind::Auth => ProviderError::Auth(message),
            FailureKind::RateLimit => ProviderError::RateLimit(message),
            FailureKind::Billing => ProviderError::Billing(message),
            FailureKind::Server => ProviderError::ServerError(message),
            FailureKind::InvalidRequest => ProviderError::InvalidRequest(message),
            FailureKind::ModelNotFound => ProviderError::ModelNotFound(message),
            FailureKind::Timeout => ProviderError::Timeout(message),
            FailureKind::Network => ProviderError::Network(message),
            FailureKind::Overloaded => ProviderError::Overloaded(message),
            FailureKind::Parse => ProviderError::Parse(message),
            FailureKind::Unknown => ProviderError::Unknown(message),
        }
    }
}

impl From<ProviderError> for StewardError {
    fn from(err: ProviderError) -> Self {
        StewardError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Steward operations.
#[derive(Error, Debug)]
pub enum StewardError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped provider errors (e.g. a provider that is not configured).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error with classification for retry decisions.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// A provider call ended in a `Failed` event. Fatal when `retryable` is false.
    #[error("Provider failed: {0}")]
    ProviderFailed(ProviderFailure),

    /// Tool execution errors (the tool ran but failed)
    #[error("Tool error: {0}")]
    Tool(String),

    /// Tool arguments did not satisfy the tool's parameter schema
    #[error("Invalid tool arguments: {0}")]
    ToolValidation(String),

    /// The permission gate denied a sensitive tool call
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Session management errors (invalid state, persistence failures, etc.)
    #[error("Session error: {0}")]
    Session(String),

    /// A turn is already running for this session
    #[error("A turn is already in progress for session '{0}'")]
    TurnInProgress(String),

    /// The model kept requesting tools past the configured iteration bound
    #[error("Exceeded maximum tool iterations ({0})")]
    MaxIterations(usize),

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// MCP (Model Context Protocol) errors (server communication, tool execution, etc.)
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Security violations (path traversal attempts, blocked commands, etc.)
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// Resource not found (sessions, tools, providers, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StewardError {
    /// Returns `true` if this is a provider error that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StewardError::ProviderTyped(pe) => pe.is_retryable(),
            StewardError::ProviderFailed(f) => f.retryable,
            StewardError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// A specialized `Result` type for Steward operations.
pub type Result<T> = std::result::Result<T, StewardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StewardError::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StewardError = io_err.into();
        assert!(matches!(err, StewardError::Io(_)));
    }

    #[test]
    fn test_turn_in_progress_display() {
        let err = StewardError::TurnInProgress("s1".to_string());
        assert_eq!(
            err.to_string(),
            "A turn is already in progress for session 's1'"
        );
    }

    #[test]
    fn test_provider_error_retryable() {
        assert!(ProviderError::RateLimit("slow down".into()).is_retryable());
        assert!(ProviderError::ServerError("boom".into()).is_retryable());
        assert!(ProviderError::Timeout("read".into()).is_retryable());
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(ProviderError::Overloaded("busy".into()).is_retryable());

        assert!(!ProviderError::Auth("bad key".into()).is_retryable());
        assert!(!ProviderError::Billing("quota".into()).is_retryable());
        assert!(!ProviderError::InvalidRequest("bad".into()).is_retryable());
        assert!(!ProviderError::Parse("garbage".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_status_codes() {
        assert_eq!(ProviderError::Auth(String::new()).status_code(), Some(401));
        assert_eq!(
            ProviderError::RateLimit(String::new()).status_code(),
            Some(429)
        );
        assert_eq!(ProviderError::Timeout(String::new()).status_code(), None);
    }

    #[test]
    fn test_kind_mapping_preserves_retryability() {
        let cases = vec![
            ProviderError::Auth("a".into()),
            ProviderError::RateLimit("r".into()),
            ProviderError::ServerError("s".into()),
            ProviderError::Timeout("t".into()),
            ProviderError::Parse("p".into()),
        ];
        for err in cases {
            let rebuilt = ProviderError::from_kind(err.kind(), "x");
            assert_eq!(rebuilt.is_retryable(), err.is_retryable(), "{}", err);
        }
    }

    #[test]
    fn test_steward_error_is_retryable() {
        let err: StewardError = ProviderError::RateLimit("429".into()).into();
        assert!(err.is_retryable());
        assert!(!StewardError::Cancelled.is_retryable());
    }
}
