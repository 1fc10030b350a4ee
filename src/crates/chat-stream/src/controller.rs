//! Stream session controller
//!
//! Owns the lifecycle of one streaming connection per conversation turn:
//! opens the push channel (resuming from the recovery cache when a prior
//! turn was interrupted), decodes and delivers chunks to the caller's sink,
//! persists progress after every chunk, and exposes cancellation plus a
//! completion signal.

use crate::cache::RecoveryCache;
use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::error::StreamError;
use crate::resume::ResumeCoordinator;
use crate::sink::StreamSink;
use crate::transport::{self, SseTransport};
use crate::types::ChatMode;
use eventsource_stream::{Event, EventStreamError};
use futures::{Stream, StreamExt};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Reserved payload value denoting explicit end-of-stream, distinct from
/// the transport-level close.
pub(crate) const DONE_SENTINEL: &str = "[DONE]";

/// Parameters for one streaming turn.
pub struct StreamOptions {
    /// Server-assigned conversation identifier. Must be non-empty.
    pub session_id: String,
    /// Backend pipeline for this turn.
    pub mode: ChatMode,
    /// Receives decoded chunks and terminal notifications.
    pub sink: Arc<dyn StreamSink>,
}

/// How a stream reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Explicit end sentinel or clean close; the cache entry was cleared.
    Finished,
    /// Caller-requested teardown; the cache entry was left in place.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Opening,
    Streaming,
    Finished,
    Cancelled,
    Failed,
}

/// Handle to one in-flight stream.
#[derive(Debug)]
pub struct StreamHandle {
    session_id: String,
    cancel: CancellationToken,
    task: JoinHandle<Result<StreamOutcome, StreamError>>,
}

impl StreamHandle {
    /// Identifier of the session this stream belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Tear down the stream. Idempotent; returns immediately after
    /// signalling teardown (physical disconnect is asynchronous). No sink
    /// callback fires after this returns; a chunk already in flight races
    /// the signal and is dropped, not delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared with the stream task; lets a sink or another component
    /// request cancellation without holding the handle.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the terminal state. Cancellation resolves successfully with
    /// [`StreamOutcome::Cancelled`]; stream failures resolve with the error
    /// already reported to the sink.
    pub async fn completion(self) -> Result<StreamOutcome, StreamError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(StreamError::Protocol(format!("stream task aborted: {e}"))),
        }
    }
}

/// Controller owning streaming sessions against one assistant backend.
///
/// The credential provider and recovery cache are injected at construction;
/// nothing is read from ambient state. One controller serves any number of
/// sessions, but at most one open stream may exist per session id — callers
/// must cancel a previous stream for the same session before starting a new
/// one.
pub struct StreamSessionController {
    config: ClientConfig,
    transport: Arc<SseTransport>,
    cache: RecoveryCache,
    resume: ResumeCoordinator,
}

impl StreamSessionController {
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
        cache: RecoveryCache,
    ) -> Self {
        let transport = Arc::new(SseTransport::new(&config, credentials));
        let resume = ResumeCoordinator::new(cache.clone());
        Self {
            config,
            transport,
            cache,
            resume,
        }
    }

    /// Start streaming one turn for `session_id`.
    ///
    /// Must be called within a Tokio runtime; the stream runs on a spawned
    /// task and keeps running if the returned handle is dropped.
    pub fn start(&self, options: StreamOptions) -> Result<StreamHandle, StreamError> {
        if options.session_id.is_empty() {
            return Err(StreamError::InvalidRequest(
                "session id must not be empty".into(),
            ));
        }

        let cancel = CancellationToken::new();
        let task = StreamTask {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            cache: self.cache.clone(),
            resume: self.resume.clone(),
            session_id: options.session_id.clone(),
            mode: options.mode,
            sink: options.sink,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        Ok(StreamHandle {
            session_id: options.session_id,
            cancel,
            task: handle,
        })
    }
}

/// How one connection attempt ended.
enum AttemptEnd {
    /// Sentinel or clean close.
    Finished,
    Cancelled,
    Interrupted {
        error: StreamError,
        /// Whether this connection delivered at least one chunk.
        progressed: bool,
    },
}

struct StreamTask {
    config: ClientConfig,
    transport: Arc<SseTransport>,
    cache: RecoveryCache,
    resume: ResumeCoordinator,
    session_id: String,
    mode: ChatMode,
    sink: Arc<dyn StreamSink>,
    cancel: CancellationToken,
}

impl StreamTask {
    async fn run(self) -> Result<StreamOutcome, StreamError> {
        let mut state = StreamState::Opening;

        // Seed accumulated output from a previously interrupted turn.
        let recovery = self.resume.recovery_point(&self.session_id);
        if let Some(entry) = &recovery {
            debug!(
                "stream {}: resuming cached turn ({} bytes, cursor {:?})",
                self.session_id,
                entry.content.len(),
                entry.last_chunk_id
            );
        }
        let mut accumulated = recovery
            .as_ref()
            .map(|e| e.content.clone())
            .unwrap_or_default();
        let mut last_chunk_id = recovery.and_then(|e| e.last_chunk_id);

        let retry = self.config.retry.clone();
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt: u32 = 0;
        let mut backoff = retry.initial_backoff();

        loop {
            if self.cancel.is_cancelled() {
                self.transition(&mut state, StreamState::Cancelled);
                return Ok(StreamOutcome::Cancelled);
            }
            attempt += 1;

            let end = self
                .stream_attempt(&mut state, &mut accumulated, &mut last_chunk_id)
                .await;
            match end {
                AttemptEnd::Finished => {
                    // A finished turn needs no recovery record.
                    self.cache.remove(&self.session_id);
                    self.transition(&mut state, StreamState::Finished);
                    if !self.cancel.is_cancelled() {
                        self.sink.on_finish();
                    }
                    return Ok(StreamOutcome::Finished);
                }
                AttemptEnd::Cancelled => {
                    self.transition(&mut state, StreamState::Cancelled);
                    return Ok(StreamOutcome::Cancelled);
                }
                AttemptEnd::Interrupted { error, progressed } => {
                    if progressed {
                        // The connection worked before breaking; this
                        // failure opens a fresh retry stretch.
                        attempt = 1;
                        backoff = retry.initial_backoff();
                    }
                    if !error.is_transient() || attempt >= max_attempts {
                        self.transition(&mut state, StreamState::Failed);
                        if !self.cancel.is_cancelled() {
                            self.sink.on_error(&error);
                        }
                        return Err(error);
                    }
                    warn!(
                        "stream {}: transient failure (attempt {attempt}/{max_attempts}), retrying in {:?}: {error}",
                        self.session_id, backoff
                    );
                    if transport::wait_before_retry(&self.cancel, backoff).await {
                        self.transition(&mut state, StreamState::Cancelled);
                        return Ok(StreamOutcome::Cancelled);
                    }
                    backoff = transport::next_backoff(backoff, retry.max_backoff());
                }
            }
        }
    }

    async fn stream_attempt(
        &self,
        state: &mut StreamState,
        accumulated: &mut String,
        last_chunk_id: &mut Option<String>,
    ) -> AttemptEnd {
        self.transition(state, StreamState::Opening);

        // Re-resolve the cursor on every attempt; it advances as chunks are
        // persisted.
        let cursor = self.resume.resume_cursor(&self.session_id);

        let open = tokio::select! {
            _ = self.cancel.cancelled() => return AttemptEnd::Cancelled,
            open = self.transport.open(&self.session_id, self.mode, cursor.as_deref()) => open,
        };
        let stream = match open {
            Ok(stream) => stream,
            Err(error) => {
                return AttemptEnd::Interrupted {
                    error,
                    progressed: false,
                }
            }
        };
        self.transition(state, StreamState::Streaming);

        tokio::pin!(stream);
        let idle_timeout = self.config.idle_timeout();
        let mut progressed = false;

        loop {
            let pulled = tokio::select! {
                _ = self.cancel.cancelled() => return AttemptEnd::Cancelled,
                pulled = next_event(&mut stream, idle_timeout) => pulled,
            };

            let event = match pulled {
                PulledEvent::Event(event) => event,
                // Clean close with no sentinel: the server considers the
                // turn done.
                PulledEvent::Closed => return AttemptEnd::Finished,
                PulledEvent::StreamError(e) => {
                    let error = match e {
                        EventStreamError::Transport(e) => StreamError::Transport(e),
                        other => StreamError::Protocol(other.to_string()),
                    };
                    return AttemptEnd::Interrupted { error, progressed };
                }
                PulledEvent::IdleTimeout => {
                    return AttemptEnd::Interrupted {
                        error: StreamError::Protocol("idle timeout waiting for events".into()),
                        progressed,
                    };
                }
            };

            if event.data.is_empty() {
                continue;
            }
            if event.data == DONE_SENTINEL {
                return AttemptEnd::Finished;
            }

            let text = decode_chunk(&event.data);
            accumulated.push_str(&text);
            if !event.id.is_empty() {
                *last_chunk_id = Some(event.id.clone());
            }
            self.cache
                .save(&self.session_id, accumulated, last_chunk_id.as_deref());
            progressed = true;

            // A chunk racing cancel() is dropped, not delivered.
            if self.cancel.is_cancelled() {
                return AttemptEnd::Cancelled;
            }
            self.sink.on_chunk(&text);
        }
    }

    fn transition(&self, state: &mut StreamState, next: StreamState) {
        if *state != next {
            debug!("stream {}: {:?} -> {:?}", self.session_id, *state, next);
            *state = next;
        }
    }
}

/// One pull from the event stream.
enum PulledEvent {
    Event(Event),
    StreamError(EventStreamError<reqwest::Error>),
    /// The transport closed the stream without an error.
    Closed,
    /// No event arrived within the configured idle window.
    IdleTimeout,
}

/// Next event from the stream, honoring the optional idle timeout.
async fn next_event<S>(stream: &mut S, idle_timeout: Option<Duration>) -> PulledEvent
where
    S: Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Unpin,
{
    let item = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(item) => item,
            Err(_) => return PulledEvent::IdleTimeout,
        },
        None => stream.next().await,
    };
    match item {
        Some(Ok(event)) => PulledEvent::Event(event),
        Some(Err(e)) => PulledEvent::StreamError(e),
        None => PulledEvent::Closed,
    }
}

/// Decode one inbound payload to sink text: structured decode with raw-text
/// fallback, normalized line endings, and any leading protocol framing left
/// over from improper nested encoding stripped.
fn decode_chunk(data: &str) -> String {
    let text = match serde_json::from_str::<serde_json::Value>(data) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => data.to_string(),
    };
    strip_data_framing(&text.replace("\r\n", "\n"))
}

/// Remove a leading `data:` marker (plus one space) from every line; some
/// relays double-wrap SSE frames.
fn strip_data_framing(text: &str) -> String {
    if !text.contains("data:") {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match line.strip_prefix("data:") {
            Some(rest) => out.push_str(rest.strip_prefix(' ').unwrap_or(rest)),
            None => out.push_str(line),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(decode_chunk("Hel"), "Hel");
    }

    #[test]
    fn json_strings_unwrap_to_their_content() {
        assert_eq!(decode_chunk("\"Hello\\nworld\""), "Hello\nworld");
    }

    #[test]
    fn non_string_json_renders_as_compact_text() {
        assert_eq!(decode_chunk("123"), "123");
        assert_eq!(decode_chunk("null"), "null");
        assert_eq!(decode_chunk("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn line_endings_are_normalized() {
        assert_eq!(decode_chunk("one\r\ntwo"), "one\ntwo");
    }

    #[test]
    fn nested_framing_is_stripped() {
        assert_eq!(decode_chunk("data: chunk"), "chunk");
        assert_eq!(decode_chunk("data:chunk"), "chunk");
        assert_eq!(decode_chunk("data: a\ndata: b"), "a\nb");
        // Mid-line markers are content, not framing.
        assert_eq!(decode_chunk("a data: b"), "a data: b");
    }

    #[test]
    fn framing_strip_keeps_unmarked_lines() {
        assert_eq!(strip_data_framing("plain\ndata: wrapped"), "plain\nwrapped");
    }
}
