//! Resume coordinator
//!
//! Supplies the "resume from here" cursor for a session. Whether to resume
//! at all is the stream controller's policy; this component only reads the
//! recovery cache.

use crate::cache::{CacheEntry, RecoveryCache};

#[derive(Clone)]
pub struct ResumeCoordinator {
    cache: RecoveryCache,
}

impl ResumeCoordinator {
    pub fn new(cache: RecoveryCache) -> Self {
        Self { cache }
    }

    /// Cursor to present to the server on connection open, or `None` to
    /// start fresh. The server owns the replay semantics and may replay
    /// zero, one, or many missed chunks.
    pub fn resume_cursor(&self, session_id: &str) -> Option<String> {
        self.cache.get(session_id)?.last_chunk_id
    }

    /// Full recovery record, used to seed accumulated content so a resumed
    /// turn appends to what was already received.
    pub fn recovery_point(&self, session_id: &str) -> Option<CacheEntry> {
        self.cache.get(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    #[test]
    fn cursor_comes_from_the_cache() {
        let cache = RecoveryCache::new(Arc::new(MemoryStorage::new()));
        let resume = ResumeCoordinator::new(cache.clone());
        assert_eq!(resume.resume_cursor("sess-1"), None);

        cache.save("sess-1", "Hi", Some("1"));
        assert_eq!(resume.resume_cursor("sess-1").as_deref(), Some("1"));

        let point = resume.recovery_point("sess-1").unwrap();
        assert_eq!(point.content, "Hi");
    }

    #[test]
    fn entry_without_cursor_yields_none() {
        let cache = RecoveryCache::new(Arc::new(MemoryStorage::new()));
        let resume = ResumeCoordinator::new(cache.clone());
        cache.save("sess-1", "Hi", None);
        assert_eq!(resume.resume_cursor("sess-1"), None);
        assert!(resume.recovery_point("sess-1").is_some());
    }
}
