//! Pattern-based error classification for LLM provider errors.
//!
//! Used for failures that arrive without a useful HTTP status, such as error
//! frames inside an already-open event stream. Checks patterns in priority
//! order: billing > auth > rate_limit > overloaded > timeout > format > server.
//! Falls back to `Unknown` if no pattern matches.

use crate::error::ProviderError;

/// Classify an error message string into a `ProviderError`.
pub fn classify_error_message(msg: &str) -> ProviderError {
    let lower = msg.to_lowercase();

    // Billing before auth: quota and payment errors mention both
    if contains_any(
        &lower,
        &[
            "402",
            "payment required",
            "insufficient_quota",
            "exceeded your current quota",
            "credit balance",
            "insufficient balance",
            "billing",
        ],
    ) {
        return ProviderError::Billing(msg.to_string());
    }

    if contains_any(
        &lower,
        &[
            "authentication_error",
            "invalid_api_key",
            "invalid api key",
            "incorrect api key",
            "unauthorized",
            "permission_error",
            "forbidden",
            "401",
            "403",
        ],
    ) {
        return ProviderError::Auth(msg.to_string());
    }

    if contains_any(
        &lower,
        &[
            "rate_limit",
            "rate limit",
            "too many requests",
            "429",
            "resource_exhausted",
        ],
    ) {
        return ProviderError::RateLimit(msg.to_string());
    }

    if contains_any(&lower, &["overloaded_error", "overloaded", "529"]) {
        return ProviderError::Overloaded(msg.to_string());
    }

    if contains_any(&lower, &["timeout", "timed out", "deadline exceeded"]) {
        return ProviderError::Timeout(msg.to_string());
    }

    if contains_any(
        &lower,
        &[
            "invalid_request_error",
            "string should match pattern",
            "tool_use_id",
            "context_length_exceeded",
        ],
    ) {
        return ProviderError::Format(msg.to_string());
    }

    if contains_any(&lower, &["api_error", "server_error", "internal error"]) {
        return ProviderError::ServerError(msg.to_string());
    }

    ProviderError::Unknown(msg.to_string())
}

fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}
