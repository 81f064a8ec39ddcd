//! Server-sent event plumbing shared by the HTTP providers.
//!
//! [`SseDecoder`] reassembles `data:` payloads across arbitrary chunk
//! boundaries. [`sse_stream`] drives one HTTP request lazily: the request is
//! sent on first poll, frames are handed to a vendor [`FrameParser`], and the
//! resulting events are yielded in order until a terminal event.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProviderError;

use super::event::{ProviderEvent, ProviderFailure, ProviderStream};

/// Incremental decoder for `text/event-stream` bodies.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every complete `data:` payload it finished.
    ///
    /// # Example
    /// ```
    /// use steward::providers::sse::SseDecoder;
    ///
    /// let mut decoder = SseDecoder::new();
    /// assert!(decoder.push(b"event: ping\ndata: {\"a\"").is_empty());
    /// assert_eq!(decoder.push(b":1}\n\n"), vec!["{\"a\":1}".to_string()]);
    /// ```
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.is_empty() {
        None
    } else {
        Some(data.to_string())
    }
}

/// Vendor-specific translation of SSE payloads into provider events.
pub trait FrameParser: Send + 'static {
    /// Translate one `data:` payload.
    fn parse(&mut self, data: &str) -> Result<Vec<ProviderEvent>, ProviderFailure>;

    /// Called when the body ends. Returns the closing events, typically a
    /// `Completed` if the vendor's end marker was seen, otherwise a failure.
    fn finish(&mut self) -> Vec<ProviderEvent>;

    /// Classify a non-success HTTP response.
    fn classify_status(&self, status: u16, body: &str) -> ProviderError;
}

/// Await one reqwest step, failing with a retryable timeout after `limit`.
///
/// Covers the phases `idle_timeout` on the body does not: waiting for
/// response headers and reading a whole non-streaming body.
pub async fn within<T, F>(limit: Duration, step: F) -> Result<T, ProviderFailure>
where
    F: Future<Output = reqwest::Result<T>>,
{
    match tokio::time::timeout(limit, step).await {
        Ok(result) => result.map_err(|e| ProviderFailure::from_reqwest(&e)),
        Err(_) => Err(timed_out(limit)),
    }
}

fn timed_out(limit: Duration) -> ProviderFailure {
    ProviderFailure::classified(ProviderError::Timeout(format!(
        "no response for {}ms",
        limit.as_millis()
    )))
}

enum Phase {
    Pending(reqwest::RequestBuilder),
    Open(BoxStream<'static, reqwest::Result<Vec<u8>>>),
    Finished,
}

struct SseState<P> {
    phase: Phase,
    parser: P,
    decoder: SseDecoder,
    pending: VecDeque<ProviderEvent>,
    idle_timeout: Duration,
}

impl<P: FrameParser> SseState<P> {
    /// Queue events up to and including the first terminal one. Returns true
    /// when a terminal event was queued.
    fn absorb(&mut self, events: Vec<ProviderEvent>) -> bool {
        for event in events {
            let terminal = event.is_terminal();
            self.pending.push_back(event);
            if terminal {
                return true;
            }
        }
        false
    }

    fn absorb_payloads(&mut self, payloads: Vec<String>) -> bool {
        for data in payloads {
            let done = match self.parser.parse(&data) {
                Ok(events) => self.absorb(events),
                Err(failure) => self.absorb(vec![ProviderEvent::Failed(failure)]),
            };
            if done {
                return true;
            }
        }
        false
    }
}

/// Drive an SSE request as a lazy provider stream.
///
/// Nothing is sent until the stream is first polled. The stream yields at
/// most one terminal event and ends immediately, without an event, when
/// `cancel` fires.
pub fn sse_stream<P: FrameParser>(
    request: reqwest::RequestBuilder,
    parser: P,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> ProviderStream {
    let state = SseState {
        phase: Phase::Pending(request),
        parser,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        idle_timeout,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }

            match std::mem::replace(&mut state.phase, Phase::Finished) {
                Phase::Finished => return None,
                Phase::Pending(request) => match within(state.idle_timeout, request.send()).await {
                    Err(failure) => {
                        state.absorb(vec![ProviderEvent::Failed(failure)]);
                    }
                    Ok(response) if !response.status().is_success() => {
                        let status = response.status().as_u16();
                        let body = within(state.idle_timeout, response.text())
                            .await
                            .unwrap_or_default();
                        debug!(status = status, "Provider returned error status");
                        let err = state.parser.classify_status(status, &body);
                        state.absorb(vec![ProviderEvent::Failed(ProviderFailure::classified(
                            err,
                        ))]);
                    }
                    Ok(response) => {
                        state.phase = Phase::Open(
                            response
                                .bytes_stream()
                                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                                .boxed(),
                        );
                    }
                },
                Phase::Open(mut body) => {
                    match tokio::time::timeout(state.idle_timeout, body.next()).await {
                        Err(_) => {
                            state.absorb(vec![ProviderEvent::Failed(timed_out(
                                state.idle_timeout,
                            ))]);
                        }
                        Ok(Some(Ok(chunk))) => {
                            let payloads = state.decoder.push(&chunk);
                            if !state.absorb_payloads(payloads) {
                                state.phase = Phase::Open(body);
                            }
                        }
                        Ok(Some(Err(e))) => {
                            state.absorb(vec![ProviderEvent::Failed(
                                ProviderFailure::from_reqwest(&e),
                            )]);
                        }
                        Ok(None) => {
                            let payloads = state.decoder.finish();
                            if !state.absorb_payloads(payloads) {
                                let closing = state.parser.finish();
                                state.absorb(closing);
                            }
                        }
                    }
                }
            }
        }
    });

    cancellable(stream.boxed(), cancel)
}

/// End `stream` silently as soon as `cancel` fires.
pub fn cancellable(stream: ProviderStream, cancel: CancellationToken) -> ProviderStream {
    stream.take_until(cancel.cancelled_owned()).boxed()
}
