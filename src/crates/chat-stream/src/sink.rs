//! Sink contract for stream consumers

use crate::error::StreamError;

/// Caller-supplied sink receiving the normalized output of one stream.
///
/// Callbacks run on the stream task, one at a time, in arrival order.
/// Calling [`crate::StreamHandle::cancel`] from inside a callback is
/// allowed and does not deadlock.
pub trait StreamSink: Send + Sync {
    /// One decoded chunk of assistant output. Delivered in order, at most
    /// once per connection lifetime.
    fn on_chunk(&self, text: &str);

    /// The turn completed successfully (explicit sentinel or clean close).
    fn on_finish(&self) {}

    /// The stream failed terminally. The recovery cache entry is left in
    /// place so a later start for the same session can resume.
    fn on_error(&self, _error: &StreamError) {}
}
