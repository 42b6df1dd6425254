//! Processed-event set: at-most-once handling per webhook event id.
//!
//! Slack redelivers an event with the same `event_id` when the first delivery was not
//! acknowledged in time. The dispatcher marks an id *before* doing any outbound work, so a
//! retry that arrives while the first delivery is still talking to the backend is dropped.
//!
//! The set is created empty at startup and lives only in memory. By default it never
//! forgets an id for the life of the process. With a capacity, the oldest marked ids are
//! evicted once it is full; ids are never promoted on lookup, so eviction order is
//! insertion order.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

/// Thread-safe set of event ids that have already been handled.
pub struct EventDeduplicator {
    seen: Mutex<LruCache<String, ()>>,
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl EventDeduplicator {
    /// Bounded set: once `capacity` ids are marked, marking a new id evicts the oldest.
    /// A capacity of 0 means no bound.
    pub fn with_capacity(capacity: usize) -> Self {
        let cache = NonZeroUsize::new(capacity)
            .map(LruCache::new)
            .unwrap_or_else(LruCache::unbounded);
        Self {
            seen: Mutex::new(cache),
        }
    }

    /// Set that never forgets an id for the life of the process.
    pub fn unbounded() -> Self {
        Self {
            seen: Mutex::new(LruCache::unbounded()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, ()>> {
        // The critical sections never panic mid-update, so a poisoned set is still consistent.
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True if `id` has been marked (and not yet evicted).
    pub fn has_seen(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    /// Mark `id` as handled. Marking an id twice is a no-op.
    pub fn mark_seen(&self, id: &str) {
        let mut seen = self.lock();
        if !seen.contains(id) {
            seen.push(id.to_string(), ());
        }
    }

    /// Atomic check-and-set: marks `id` and returns true if it was not yet seen; returns false
    /// (and changes nothing) if it was. Concurrent callers with the same id get exactly one true.
    pub fn check_and_mark(&self, id: &str) -> bool {
        let mut seen = self.lock();
        if seen.contains(id) {
            return false;
        }
        if let Some((evicted, ())) = seen.push(id.to_string(), ()) {
            log::debug!("dedup: evicted oldest event id {}", evicted);
        }
        true
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
