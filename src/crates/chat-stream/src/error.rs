//! Error types for the streaming subsystem

use reqwest::StatusCode;
use thiserror::Error;

/// Terminal stream failures.
///
/// Cancellation is not represented here: a caller-requested teardown is an
/// expected termination and resolves the stream outcome successfully.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The server rejected the open request outright (4xx other than 429).
    /// Retrying the same request will not help; the recovery cache entry is
    /// left intact so the caller can retry the turn.
    #[error("server rejected stream request: {status}")]
    Rejected { status: StatusCode },

    /// Transient server-side condition (5xx or 429). Retried by the
    /// transport; surfaced only once retries are exhausted.
    #[error("server temporarily unavailable: {status}")]
    Unavailable { status: StatusCode },

    /// The open response did not carry an event-stream content type.
    #[error("unexpected content type: {}", .0.as_deref().unwrap_or("<missing>"))]
    UnexpectedContentType(Option<String>),

    /// Connection-level failure from the HTTP client.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// SSE framing or decoding failure on an established stream.
    #[error("event stream failure: {0}")]
    Protocol(String),

    /// Caller-side precondition violation, reported before any connection
    /// attempt is made.
    #[error("invalid stream request: {0}")]
    InvalidRequest(String),
}

impl StreamError {
    /// Whether the transport may retry after this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StreamError::Unavailable { .. }
                | StreamError::Transport(_)
                | StreamError::Protocol(_)
        )
    }
}
