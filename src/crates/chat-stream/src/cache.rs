//! Local recovery cache
//!
//! Keeps the last-known accumulated output and chunk cursor for each
//! in-flight turn so an interrupted stream can be picked back up after a
//! failure or process restart.

use crate::storage::StorageBackend;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Storage key namespace; the session identifier is appended verbatim.
const CACHE_PREFIX: &str = "sessionCache_";

/// Durable recovery record for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Ordered concatenation of every chunk applied so far this turn.
    pub content: String,
    /// Identifier of the chunk that produced `content`; the resume cursor.
    pub last_chunk_id: Option<String>,
}

/// Keyed store of [`CacheEntry`] records over a [`StorageBackend`].
///
/// An entry is created on the first chunk of a turn, overwritten on every
/// subsequent chunk, removed on successful completion, and left in place on
/// failure or teardown so a later stream can resume the turn.
#[derive(Clone)]
pub struct RecoveryCache {
    backend: Arc<dyn StorageBackend>,
}

impl RecoveryCache {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    fn key(session_id: &str) -> String {
        format!("{CACHE_PREFIX}{session_id}")
    }

    /// Persist the accumulated content and cursor for a session.
    ///
    /// Empty session ids and empty content are ignored so a spurious update
    /// cannot clobber a valid entry. Storage failures are logged and
    /// swallowed.
    pub fn save(&self, session_id: &str, content: &str, last_chunk_id: Option<&str>) {
        if session_id.is_empty() || content.is_empty() {
            return;
        }
        let entry = CacheEntry {
            content: content.to_string(),
            last_chunk_id: last_chunk_id.map(str::to_string),
        };
        let value = match serde_json::to_string(&entry) {
            Ok(value) => value,
            Err(e) => {
                warn!("recovery cache: failed to encode entry for {session_id}: {e}");
                return;
            }
        };
        if let Err(e) = self.backend.write(&Self::key(session_id), &value) {
            warn!("recovery cache: failed to save entry for {session_id}: {e}");
        }
    }

    /// Fetch the recovery record for a session. Corruption and storage
    /// failures are logged and treated as a miss.
    pub fn get(&self, session_id: &str) -> Option<CacheEntry> {
        if session_id.is_empty() {
            return None;
        }
        let raw = match self.backend.read(&Self::key(session_id)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("recovery cache: failed to read entry for {session_id}: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("recovery cache: corrupt entry for {session_id}, ignoring: {e}");
                None
            }
        }
    }

    /// Drop the recovery record for a session.
    pub fn remove(&self, session_id: &str) {
        if session_id.is_empty() {
            return;
        }
        if let Err(e) = self.backend.delete(&Self::key(session_id)) {
            warn!("recovery cache: failed to remove entry for {session_id}: {e}");
        } else {
            debug!("recovery cache: cleared entry for {session_id}");
        }
    }

    pub fn has(&self, session_id: &str) -> bool {
        self.get(session_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn cache() -> (Arc<MemoryStorage>, RecoveryCache) {
        let backend = Arc::new(MemoryStorage::new());
        (backend.clone(), RecoveryCache::new(backend))
    }

    #[test]
    fn save_and_get_round_trip() {
        let (_, cache) = cache();
        cache.save("sess-1", "Hello", Some("42"));
        let entry = cache.get("sess-1").unwrap();
        assert_eq!(entry.content, "Hello");
        assert_eq!(entry.last_chunk_id.as_deref(), Some("42"));
        assert!(cache.has("sess-1"));
    }

    #[test]
    fn entries_are_namespaced() {
        let (backend, cache) = cache();
        cache.save("sess-1", "Hello", None);
        assert!(backend.read("sessionCache_sess-1").unwrap().is_some());
    }

    #[test]
    fn stored_record_uses_wire_field_names() {
        let (backend, cache) = cache();
        cache.save("sess-1", "Hello", Some("42"));
        let raw = backend.read("sessionCache_sess-1").unwrap().unwrap();
        assert!(raw.contains("\"lastChunkId\":\"42\""), "got {raw}");
    }

    #[test]
    fn empty_arguments_are_ignored() {
        let (_, cache) = cache();
        cache.save("", "Hello", None);
        assert!(!cache.has(""));

        cache.save("sess-1", "Hello", Some("1"));
        cache.save("sess-1", "", Some("2"));
        let entry = cache.get("sess-1").unwrap();
        assert_eq!(entry.content, "Hello");
        assert_eq!(entry.last_chunk_id.as_deref(), Some("1"));
    }

    #[test]
    fn corrupt_entry_reads_as_miss() {
        let (backend, cache) = cache();
        backend.write("sessionCache_sess-1", "not json").unwrap();
        assert_eq!(cache.get("sess-1"), None);
        assert!(!cache.has("sess-1"));
    }

    #[test]
    fn remove_clears_the_entry() {
        let (_, cache) = cache();
        cache.save("sess-1", "Hello", Some("1"));
        cache.remove("sess-1");
        assert_eq!(cache.get("sess-1"), None);
        // Removing again is a no-op.
        cache.remove("sess-1");
    }
}
