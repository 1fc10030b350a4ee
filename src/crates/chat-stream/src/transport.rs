//! SSE transport
//!
//! Opens the unidirectional push channel for a session and validates the
//! response before handing the event stream to the controller. The backoff
//! mechanics for transient failures live here too; the controller picks the
//! policy, this module does the waiting.

use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::error::StreamError;
use crate::types::ChatMode;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::Stream;
use log::warn;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";

/// Header carrying the resume cursor on the connection-open request.
pub const LAST_CHUNK_ID_HEADER: &str = "last-chunk-id";

pub(crate) struct SseTransport {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl SseTransport {
    pub(crate) fn new(config: &ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .use_rustls_tls()
            .build()
            .unwrap_or_else(|e| {
                warn!("failed to build HTTP client, using default config: {e}");
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: config.base_url.clone(),
            credentials,
        }
    }

    /// Open the push channel for one session, attaching the credential and,
    /// when resuming, the last-chunk cursor.
    ///
    /// 5xx and 429 responses are reported as transient; any other
    /// non-success status, and a success without an event-stream content
    /// type, is non-retryable.
    pub(crate) async fn open(
        &self,
        session_id: &str,
        mode: ChatMode,
        cursor: Option<&str>,
    ) -> Result<impl Stream<Item = Result<Event, EventStreamError<reqwest::Error>>>, StreamError>
    {
        let url = compose_chat_url(&self.base_url, mode);
        let mut request = self
            .client
            .get(&url)
            .query(&[("sessionId", session_id)])
            .header(ACCEPT, EVENT_STREAM_MIME_TYPE)
            .header(
                USER_AGENT,
                concat!("Rill-Chat-Client/", env!("CARGO_PKG_VERSION")),
            );

        if let Some(auth) = self
            .credentials
            .token()
            .as_deref()
            .and_then(normalize_authorization_value)
        {
            request = request.header(AUTHORIZATION, auth);
        }
        if let Some(cursor) = cursor {
            request = request.header(LAST_CHUNK_ID_HEADER, cursor);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(StreamError::Unavailable { status });
            }
            return Err(StreamError::Rejected { status });
        }

        match response.headers().get(CONTENT_TYPE) {
            Some(ct) if ct.as_bytes().starts_with(EVENT_STREAM_MIME_TYPE.as_bytes()) => {}
            other => {
                let found = other.map(|ct| String::from_utf8_lossy(ct.as_bytes()).to_string());
                return Err(StreamError::UnexpectedContentType(found));
            }
        }

        Ok(response.bytes_stream().eventsource())
    }
}

/// Normalize the caller-supplied credential into an Authorization value.
///
/// Raw tokens are assumed to be bearer credentials; values that already
/// carry a scheme are kept as-is.
fn normalize_authorization_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.to_ascii_lowercase().starts_with("bearer ") {
        return Some(trimmed.to_string());
    }
    if trimmed.contains(char::is_whitespace) {
        return Some(trimmed.to_string());
    }

    Some(format!("Bearer {trimmed}"))
}

fn compose_chat_url(base_url: &str, mode: ChatMode) -> String {
    format!(
        "{}/assistant/{}/chat",
        base_url.trim_end_matches('/'),
        mode.as_route()
    )
}

/// Wait out a backoff delay; returns `true` if cancelled while waiting.
pub(crate) async fn wait_before_retry(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

/// Doubling backoff, capped.
pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}
