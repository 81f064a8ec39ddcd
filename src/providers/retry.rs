//! Retry provider - decorator that adds automatic retry with exponential backoff.
//!
//! Wraps any [`LLMProvider`] to transparently retry transient failures such as
//! HTTP 429 (rate limit), 5xx (server errors), and provider overload conditions.
//!
//! A retried call that had already emitted events yields
//! [`ProviderEvent::Reset`] before the fresh attempt, so consumers discard the
//! partial output. When retries run out the last failure is re-emitted as
//! non-retryable.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use steward::providers::{ClaudeProvider, RetryProvider};
//!
//! let inner = ClaudeProvider::new("api-key");
//! let provider = RetryProvider::new(Arc::new(inner))
//!     .with_max_retries(5)
//!     .with_base_delay_ms(500);
//!
//! // Use `provider` as any other LLMProvider; retries happen automatically.
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{Result, StewardError};

use super::event::{ProviderEvent, ProviderStream};
use super::sse::cancellable;
use super::{ChatRequest, LLMProvider, LLMResponse};

/// A decorator provider that retries transient LLM failures with exponential backoff.
///
/// Non-transient failures (auth, billing, invalid request, parse) pass through
/// on the first attempt.
pub struct RetryProvider {
    /// The wrapped provider that performs actual LLM requests.
    inner: Arc<dyn LLMProvider>,
    /// Maximum number of retry attempts before giving up. Default: 3.
    max_retries: u32,
    /// Base delay in milliseconds for exponential backoff. Default: 1000 (1 second).
    base_delay_ms: u64,
    /// Maximum delay cap in milliseconds. Default: 30000 (30 seconds).
    max_delay_ms: u64,
}

impl std::fmt::Debug for RetryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryProvider")
            .field("inner", &self.inner.name())
            .field("max_retries", &self.max_retries)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .finish()
    }
}

impl RetryProvider {
    /// Create a new `RetryProvider` wrapping the given inner provider.
    ///
    /// Uses default retry settings:
    /// - `max_retries`: 3
    /// - `base_delay_ms`: 1000 (1 second)
    /// - `max_delay_ms`: 30000 (30 seconds)
    pub fn new(inner: Arc<dyn LLMProvider>) -> Self {
        Self {
            inner,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }

    /// Apply the retry section of the configuration.
    pub fn with_config(self, config: &RetryConfig) -> Self {
        self.with_max_retries(config.max_retries)
            .with_base_delay_ms(config.base_delay_ms)
            .with_max_delay_ms(config.max_delay_ms)
    }

    /// Set the maximum number of retry attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay in milliseconds for exponential backoff.
    ///
    /// The actual delay for attempt `n` is:
    /// `min(base_delay_ms * 2^n + jitter, max_delay_ms)`
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set the maximum delay cap in milliseconds.
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }
}

/// Compute and sleep for the backoff delay for a given retry attempt.
///
/// Delay formula: `min(base_delay_ms * 2^attempt + jitter, max_delay_ms)`
///
/// Jitter is derived from the current system time (nanosecond component),
/// which is enough to decorrelate concurrent retries.
pub async fn delay_with_jitter(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) {
    let jitter_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 % (base_delay_ms.max(1)))
        .unwrap_or(0);

    let delay = compute_delay(attempt, base_delay_ms, max_delay_ms, jitter_ms);
    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
}

/// Compute the backoff delay for a given attempt (without sleeping).
///
/// # Returns
/// The computed delay in milliseconds.
pub fn compute_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64, jitter_ms: u64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(16));
    exponential.saturating_add(jitter_ms).min(max_delay_ms)
}

struct RetryState {
    inner: Arc<dyn LLMProvider>,
    request: ChatRequest,
    cancel: CancellationToken,
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    /// Retries performed so far
    attempt: u32,
    current: Option<ProviderStream>,
    /// Whether the current attempt has yielded anything
    emitted: bool,
    /// Sleep before opening the next attempt
    backoff: bool,
    done: bool,
}

#[async_trait]
impl LLMProvider for RetryProvider {
    fn name(&self) -> &str {
        // The wrapping is evident from the type; report the vendor.
        self.inner.name()
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    fn stream(&self, request: ChatRequest, cancel: CancellationToken) -> ProviderStream {
        let state = RetryState {
            inner: Arc::clone(&self.inner),
            request,
            cancel: cancel.clone(),
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            attempt: 0,
            current: None,
            emitted: false,
            backoff: false,
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if state.done {
                    return None;
                }

                if state.backoff {
                    state.backoff = false;
                    let delay = delay_with_jitter(
                        state.attempt - 1,
                        state.base_delay_ms,
                        state.max_delay_ms,
                    );
                    tokio::select! {
                        biased;
                        _ = state.cancel.cancelled() => return None,
                        _ = delay => {}
                    }
                }

                let current = state.current.get_or_insert_with(|| {
                    state
                        .inner
                        .stream(state.request.clone(), state.cancel.clone())
                });

                let next = current.next().await;
                match next {
                    None => return None,
                    Some(ProviderEvent::Failed(failure)) if failure.retryable => {
                        state.current = None;
                        if state.attempt >= state.max_retries {
                            state.done = true;
                            let exhausted = failure.exhausted(state.attempt + 1);
                            return Some((ProviderEvent::Failed(exhausted), state));
                        }

                        state.attempt += 1;
                        warn!(
                            provider = state.inner.name(),
                            attempt = state.attempt,
                            max_retries = state.max_retries,
                            error = %failure,
                            "Retrying provider call after transient error"
                        );
                        state.backoff = true;
                        if std::mem::take(&mut state.emitted) {
                            let attempt = state.attempt;
                            return Some((ProviderEvent::Reset { attempt }, state));
                        }
                    }
                    Some(event) => {
                        state.done = event.is_terminal();
                        state.emitted = true;
                        return Some((event, state));
                    }
                }
            }
        });

        cancellable(stream.boxed(), cancel)
    }

    async fn complete(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<LLMResponse> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone(), cancel.clone()).await {
                Err(err) if err.is_retryable() => {
                    if attempt >= self.max_retries {
                        return Err(match err {
                            StewardError::ProviderFailed(f) => f.exhausted(attempt + 1).into_error(),
                            other => other,
                        });
                    }
                    attempt += 1;
                    warn!(
                        provider = self.inner.name(),
                        attempt = attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "Retrying completion after transient error"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(StewardError::Cancelled),
                        _ = delay_with_jitter(attempt - 1, self.base_delay_ms, self.max_delay_ms) => {}
                    }
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::{FinishReason, ProviderFailure, ScriptedProvider, UsageReport};
    use std::time::Duration;

    fn transient() -> ProviderEvent {
        ProviderEvent::Failed(ProviderFailure::classified(ProviderError::ServerError(
            "502 bad gateway".into(),
        )))
    }

    fn ok_reply(text: &str) -> Vec<ProviderEvent> {
        ScriptedProvider::text_reply(&[text], UsageReport::default())
    }

    fn fast(inner: &ScriptedProvider, max_retries: u32) -> RetryProvider {
        RetryProvider::new(Arc::new(inner.clone()))
            .with_max_retries(max_retries)
            .with_base_delay_ms(1)
            .with_max_delay_ms(5)
    }

    async fn drain(provider: &RetryProvider) -> Vec<ProviderEvent> {
        provider
            .stream(ChatRequest::default(), CancellationToken::new())
            .collect()
            .await
    }

    #[test]
    fn test_retry_provider_builder() {
        let inner = ScriptedProvider::default();
        let provider = RetryProvider::new(Arc::new(inner))
            .with_max_retries(5)
            .with_base_delay_ms(500)
            .with_max_delay_ms(10_000);
        assert_eq!(provider.max_retries, 5);
        assert_eq!(provider.base_delay_ms, 500);
        assert_eq!(provider.max_delay_ms, 10_000);
        assert_eq!(provider.name(), "scripted");
    }

    #[test]
    fn test_with_config() {
        let config = RetryConfig {
            enabled: true,
            max_retries: 7,
            base_delay_ms: 10,
            max_delay_ms: 20,
        };
        let provider = RetryProvider::new(Arc::new(ScriptedProvider::default())).with_config(&config);
        assert_eq!(provider.max_retries, 7);
        assert_eq!(provider.max_delay_ms, 20);
    }

    #[test]
    fn test_delay_calculation() {
        assert_eq!(compute_delay(0, 1000, 30_000, 0), 1000);
        assert_eq!(compute_delay(1, 1000, 30_000, 0), 2000);
        assert_eq!(compute_delay(3, 1000, 30_000, 0), 8000);
        assert_eq!(compute_delay(1, 1000, 30_000, 250), 2250);
    }

    #[test]
    fn test_delay_calculation_capped_at_max() {
        assert_eq!(compute_delay(10, 1000, 30_000, 0), 30_000);
        assert_eq!(compute_delay(4, 1000, 16_500, 999), 16_500);
        assert_eq!(compute_delay(63, u64::MAX, u64::MAX, 5), u64::MAX);
    }

    #[tokio::test]
    async fn test_failure_before_output_retries_silently() {
        let inner = ScriptedProvider::new(vec![vec![transient()], ok_reply("fine")]);
        let events = drain(&fast(&inner, 3)).await;

        assert_eq!(inner.calls(), 2);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ProviderEvent::Reset { .. })));
        assert_eq!(events[0], ProviderEvent::TextDelta("fine".into()));
        assert_eq!(
            events.last(),
            Some(&ProviderEvent::Completed(FinishReason::EndTurn))
        );
    }

    #[tokio::test]
    async fn test_failure_after_output_emits_reset() {
        let inner = ScriptedProvider::new(vec![
            vec![ProviderEvent::TextDelta("stale".into()), transient()],
            ok_reply("fresh"),
        ]);
        let events = drain(&fast(&inner, 3)).await;

        assert_eq!(events[0], ProviderEvent::TextDelta("stale".into()));
        assert_eq!(events[1], ProviderEvent::Reset { attempt: 1 });
        assert_eq!(events[2], ProviderEvent::TextDelta("fresh".into()));
        assert!(events.last().is_some_and(ProviderEvent::is_terminal));
    }

    #[tokio::test]
    async fn test_exhaustion_is_fatal() {
        let inner = ScriptedProvider::new(vec![vec![transient()], vec![transient()], vec![transient()]]);
        let events = drain(&fast(&inner, 2)).await;

        assert_eq!(inner.calls(), 3);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProviderEvent::Failed(f) => {
                assert!(!f.retryable);
                assert!(f.message.contains("retries exhausted after 3 attempts"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_passes_through() {
        let auth = ProviderEvent::Failed(ProviderFailure::classified(ProviderError::Auth(
            "bad key".into(),
        )));
        let inner = ScriptedProvider::new(vec![vec![auth.clone()], ok_reply("never")]);
        let events = drain(&fast(&inner, 3)).await;

        assert_eq!(inner.calls(), 1);
        assert_eq!(events, vec![auth]);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_ends_stream() {
        let inner = ScriptedProvider::new(vec![vec![transient()], ok_reply("late")]);
        let provider = RetryProvider::new(Arc::new(inner.clone()))
            .with_base_delay_ms(60_000)
            .with_max_delay_ms(60_000);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let events: Vec<_> = provider
            .stream(ChatRequest::default(), cancel)
            .collect()
            .await;
        assert!(events.is_empty());
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_complete_retries_and_exhausts() {
        let inner = ScriptedProvider::new(vec![vec![transient()], ok_reply("done")]);
        let response = fast(&inner, 1)
            .complete(ChatRequest::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.content, "done");

        let inner = ScriptedProvider::new(vec![vec![transient()], vec![transient()]]);
        let err = fast(&inner, 1)
            .complete(ChatRequest::default(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(inner.calls(), 2);
    }
}
