//! L1 Store Module
//!
//! Bounded in-process table of decoded values with LRU eviction, bounded both
//! by entry count and by an estimated byte budget.

use std::collections::HashMap;

use crate::cache::{CacheEntry, LruTracker, NativeValue};

// == Insert Outcome ==
/// Result of offering an entry to L1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Whether the entry is now resident
    pub admitted: bool,
    /// Number of other entries evicted to make room
    pub evicted: usize,
}

// == L1 Store ==
#[derive(Debug)]
pub struct L1Store {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Byte budget across all entries
    max_bytes: usize,
    /// Sum of `approx_size_bytes` over resident entries
    used_bytes: usize,
}

impl L1Store {
    // == Constructor ==
    /// Creates a new store with the given capacity limits.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries the store can hold
    /// * `max_bytes` - Estimated byte budget for all entries together
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            max_entries,
            max_bytes,
            used_bytes: 0,
        }
    }

    // == Insert ==
    /// Stores a decoded value, replacing any previous entry for `key`.
    ///
    /// Least recently used entries are evicted until the new entry fits both
    /// limits. An entry larger than the whole byte budget is not admitted and
    /// any older entry for the key is dropped.
    pub fn insert(
        &mut self,
        key: &str,
        value: NativeValue,
        size: usize,
        ttl_ms: Option<u64>,
    ) -> InsertOutcome {
        self.remove(key);

        if self.max_entries == 0 || size > self.max_bytes {
            return InsertOutcome {
                admitted: false,
                evicted: 0,
            };
        }

        let mut evicted = 0;
        while self.entries.len() >= self.max_entries || self.used_bytes + size > self.max_bytes {
            match self.lru.evict_oldest() {
                Some(oldest) => {
                    if let Some(entry) = self.entries.remove(&oldest) {
                        self.used_bytes -= entry.approx_size_bytes;
                        evicted += 1;
                    }
                }
                None => break,
            }
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(key, value, size, ttl_ms));
        self.used_bytes += size;
        self.lru.touch(key);

        InsertOutcome {
            admitted: true,
            evicted,
        }
    }

    // == Get ==
    /// Returns the live entry for `key` and marks it most recently used.
    ///
    /// Expired entries are removed and reported as absent.
    pub fn get(&mut self, key: &str) -> Option<&CacheEntry> {
        if self.purge_if_expired(key) {
            return None;
        }
        if self.entries.contains_key(key) {
            self.lru.touch(key);
        }
        self.entries.get(key)
    }

    // == Contains ==
    /// Checks for a live entry without affecting recency.
    pub fn contains(&mut self, key: &str) -> bool {
        !self.purge_if_expired(key) && self.entries.contains_key(key)
    }

    // == Remove ==
    /// Removes an entry by key, returning whether it was resident.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.lru.remove(key);
                self.used_bytes -= entry.approx_size_bytes;
                true
            }
            None => false,
        }
    }

    /// Removes every entry whose key satisfies `pred`.
    pub fn remove_where<F: Fn(&str) -> bool>(&mut self, pred: F) -> usize {
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|k| pred(k))
            .cloned()
            .collect();
        doomed.iter().filter(|k| self.remove(k)).count()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        expired.iter().filter(|k| self.remove(k)).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimated bytes held by resident entries.
    pub fn bytes(&self) -> usize {
        self.used_bytes
    }

    fn purge_if_expired(&mut self, key: &str) -> bool {
        let expired = self.entries.get(key).is_some_and(|e| e.is_expired());
        if expired {
            self.remove(key);
        }
        expired
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread::sleep;
    use std::time::Duration;

    fn native(s: &str) -> NativeValue {
        Arc::new(s.to_string())
    }

    fn value_of(store: &mut L1Store, key: &str) -> Option<String> {
        store.get(key).and_then(|e| e.downcast::<String>())
    }

    #[test]
    fn test_store_new() {
        let store = L1Store::new(100, 1024);
        assert_eq!(store.len(), 0);
        assert_eq!(store.bytes(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_insert_and_get() {
        let mut store = L1Store::new(100, 1024);

        let outcome = store.insert("key1", native("value1"), 8, None);
        assert!(outcome.admitted);
        assert_eq!(value_of(&mut store, "key1").as_deref(), Some("value1"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.bytes(), 8);
    }

    #[test]
    fn test_store_overwrite_replaces_size() {
        let mut store = L1Store::new(100, 1024);

        store.insert("key1", native("value1"), 8, None);
        store.insert("key1", native("value2"), 20, None);

        assert_eq!(value_of(&mut store, "key1").as_deref(), Some("value2"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.bytes(), 20);
    }

    #[test]
    fn test_store_remove() {
        let mut store = L1Store::new(100, 1024);

        store.insert("key1", native("value1"), 8, None);
        assert!(store.remove("key1"));
        assert!(!store.remove("key1"));
        assert!(store.is_empty());
        assert_eq!(store.bytes(), 0);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = L1Store::new(100, 1024);

        store.insert("key1", native("value1"), 8, Some(1_000));
        assert!(store.contains("key1"));

        sleep(Duration::from_millis(1100));

        assert!(!store.contains("key1"));
        assert!(store.get("key1").is_none());
        assert_eq!(store.bytes(), 0);
    }

    #[test]
    fn test_store_lru_eviction_by_count() {
        let mut store = L1Store::new(3, 1024);

        store.insert("key1", native("v"), 1, None);
        store.insert("key2", native("v"), 1, None);
        store.insert("key3", native("v"), 1, None);
        let outcome = store.insert("key4", native("v"), 1, None);

        assert_eq!(outcome.evicted, 1);
        assert_eq!(store.len(), 3);
        assert!(!store.contains("key1"));
        assert!(store.contains("key4"));
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let mut store = L1Store::new(3, 1024);

        store.insert("key1", native("v"), 1, None);
        store.insert("key2", native("v"), 1, None);
        store.insert("key3", native("v"), 1, None);
        store.get("key1");
        store.insert("key4", native("v"), 1, None);

        assert!(store.contains("key1"));
        assert!(!store.contains("key2"));
    }

    #[test]
    fn test_store_eviction_by_bytes() {
        let mut store = L1Store::new(100, 100);

        store.insert("a", native("v"), 40, None);
        store.insert("b", native("v"), 40, None);
        let outcome = store.insert("c", native("v"), 50, None);

        assert!(outcome.admitted);
        assert_eq!(outcome.evicted, 1);
        assert!(!store.contains("a"));
        assert_eq!(store.bytes(), 90);
    }

    #[test]
    fn test_store_rejects_entry_larger_than_budget() {
        let mut store = L1Store::new(100, 100);

        store.insert("big", native("small first"), 10, None);
        let outcome = store.insert("big", native("huge"), 101, None);

        assert!(!outcome.admitted);
        assert!(!store.contains("big"));
        assert_eq!(store.bytes(), 0);
    }

    #[test]
    fn test_store_remove_where() {
        let mut store = L1Store::new(100, 1024);
        store.insert("user:1", native("v"), 1, None);
        store.insert("user:2", native("v"), 1, None);
        store.insert("post:1", native("v"), 1, None);

        assert_eq!(store.remove_where(|k| k.starts_with("user:")), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = L1Store::new(100, 1024);

        store.insert("key1", native("v"), 5, Some(1_000));
        store.insert("key2", native("v"), 5, Some(10_000));
        sleep(Duration::from_millis(1100));

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.bytes(), 5);
        assert!(store.contains("key2"));
    }
}
