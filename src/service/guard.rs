//! Read-admission guards.
//!
//! [`WriteFence`] lets a read that went to L2 tell whether a write to the same
//! key landed while it was in flight. [`PinnedCaps`] remembers the L1 size cap
//! of keys written under an explicit policy that is stricter than the one
//! their key pattern resolves to.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::cache::current_timestamp_ms;

const SHARD_COUNT: usize = 64;

// == Write Fence ==
/// Per-shard write counters. Keys sharing a shard share a counter, so a write
/// can only make a concurrent read skip admission, never admit a stale value.
pub(super) struct WriteFence {
    shards: Box<[AtomicU64]>,
}

impl WriteFence {
    pub(super) fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn shard(&self, key: &str) -> &AtomicU64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Stamp to capture before reading `key` from L2.
    pub(super) fn observe(&self, key: &str) -> u64 {
        self.shard(key).load(Ordering::Acquire)
    }

    /// Whether no write to `key` has been recorded since `stamp`.
    pub(super) fn unchanged(&self, key: &str, stamp: u64) -> bool {
        self.observe(key) == stamp
    }

    /// Records a write to `key`. Must be called with the L1 lock held.
    pub(super) fn advance(&self, key: &str) {
        self.shard(key).fetch_add(1, Ordering::AcqRel);
    }

    /// Records a write that may touch any key.
    pub(super) fn advance_all(&self) {
        for shard in self.shards.iter() {
            shard.fetch_add(1, Ordering::AcqRel);
        }
    }
}

// == Pinned Caps ==
#[derive(Debug, Clone, Copy)]
struct PinnedCap {
    max_bytes: usize,
    /// Unix milliseconds
    expires_at: u64,
}

/// Size caps that outlive the L1 entry they were applied to, kept until the
/// L2 entry they describe would have expired.
#[derive(Default)]
pub(super) struct PinnedCaps {
    caps: Mutex<HashMap<String, PinnedCap>>,
}

impl PinnedCaps {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn pin(&self, key: &str, max_bytes: usize, ttl_seconds: u64) {
        let expires_at = current_timestamp_ms().saturating_add(ttl_seconds.saturating_mul(1000));
        self.caps.lock().insert(
            key.to_string(),
            PinnedCap {
                max_bytes,
                expires_at,
            },
        );
    }

    pub(super) fn unpin(&self, key: &str) {
        self.caps.lock().remove(key);
    }

    pub(super) fn unpin_where<F: Fn(&str) -> bool>(&self, pred: F) {
        self.caps.lock().retain(|key, _| !pred(key));
    }

    /// The pinned cap for `key`, if one is still live.
    pub(super) fn get(&self, key: &str) -> Option<usize> {
        let mut caps = self.caps.lock();
        let pinned = *caps.get(key)?;
        if current_timestamp_ms() >= pinned.expires_at {
            caps.remove(key);
            return None;
        }
        Some(pinned.max_bytes)
    }

    pub(super) fn cleanup_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut caps = self.caps.lock();
        let before = caps.len();
        caps.retain(|_, pinned| pinned.expires_at > now);
        before - caps.len()
    }

    pub(super) fn len(&self) -> usize {
        self.caps.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_fence_tracks_writes_per_key() {
        let fence = WriteFence::new();
        let stamp = fence.observe("a");

        assert!(fence.unchanged("a", stamp));
        fence.advance("a");
        assert!(!fence.unchanged("a", stamp));

        let stamp = fence.observe("b");
        fence.advance_all();
        assert!(!fence.unchanged("b", stamp));
    }

    #[test]
    fn test_pinned_cap_lifecycle() {
        let caps = PinnedCaps::new();
        caps.pin("k", 4096, 60);
        assert_eq!(caps.get("k"), Some(4096));

        caps.unpin("k");
        assert_eq!(caps.get("k"), None);

        caps.pin("user:1", 10, 60);
        caps.pin("user:2", 10, 60);
        caps.pin("post:1", 10, 60);
        caps.unpin_where(|k| k.starts_with("user:"));
        assert_eq!(caps.len(), 1);
    }

    #[test]
    fn test_pinned_cap_expires_with_ttl() {
        let caps = PinnedCaps::new();
        caps.pin("short", 10, 1);
        caps.pin("long", 10, 60);
        sleep(Duration::from_millis(1100));

        assert_eq!(caps.cleanup_expired(), 1);
        assert_eq!(caps.get("short"), None);
        assert_eq!(caps.get("long"), Some(10));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let caps = PinnedCaps::new();
        caps.pin("k", 10, u64::MAX);
        assert_eq!(caps.get("k"), Some(10));
    }
}
