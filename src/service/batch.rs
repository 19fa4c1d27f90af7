//! Batch operations: one L2 round trip per call regardless of key count.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use tracing::{debug, warn};

use super::{read_ttl_ms, Admission, CacheService, CacheValue};
use crate::l2::SetEntry;

impl CacheService {
    /// Fetches many keys, answering from L1 where possible and fetching the
    /// rest with a single multi-get.
    ///
    /// Every requested key appears in the result. Each key counts as one hit
    /// or one miss; if the multi-get fails, every key not served by L1 is a
    /// miss.
    pub async fn batch_get<T: CacheValue>(&self, keys: &[String]) -> HashMap<String, Option<T>> {
        let started = Instant::now();
        let mut results: HashMap<String, Option<T>> = HashMap::with_capacity(keys.len());
        let mut remote: Vec<String> = Vec::new();

        for key in keys {
            if results.contains_key(key) {
                continue;
            }
            match self.l1_get::<T>(key) {
                Some(value) => {
                    results.insert(key.clone(), Some(value));
                }
                None => {
                    results.insert(key.clone(), None);
                    remote.push(key.clone());
                }
            }
        }

        if !remote.is_empty() {
            let stamps: Vec<u64> = remote.iter().map(|k| self.inner.fence.observe(k)).collect();
            match self.inner.l2.mget(&remote).await {
                Ok(values) => {
                    let mut corrupt = Vec::new();
                    for ((key, stored), stamp) in remote.iter().zip(values).zip(stamps) {
                        let Some(stored) = stored else { continue };
                        match self.inner.codec.decode::<T>(&stored.bytes) {
                            Ok(value) => {
                                let policy = self.inner.policies.resolve(key, None);
                                self.admit(
                                    key,
                                    value.clone(),
                                    stored.bytes.len(),
                                    self.read_cap(key, policy),
                                    read_ttl_ms(policy, stored.ttl_ms),
                                    Admission::Read { stamp },
                                );
                                results.insert(key.clone(), Some(value));
                            }
                            Err(e) => {
                                warn!(key = %key, error = %e, "undecodable cache entry, purging");
                                corrupt.push(key.clone());
                            }
                        }
                    }
                    if !corrupt.is_empty() {
                        self.evict_written(&corrupt);
                        if let Err(e) = self.inner.l2.delete_many(&corrupt).await {
                            self.backend_failure("purge", &corrupt.join(","), &e);
                        }
                    }
                }
                Err(e) => self.backend_failure("batch get", &format!("{} keys", remote.len()), &e),
            }
        }

        for value in results.values() {
            if value.is_some() {
                self.inner.metrics.record_hit();
            } else {
                self.inner.metrics.record_miss();
            }
        }
        self.inner.metrics.record_latency(started.elapsed());
        debug!(requested = keys.len(), remote = remote.len(), "batch get");
        results
    }

    /// Stores many values with one pipelined multi-set.
    ///
    /// Each key uses its own resolved policy; `ttl` overrides every policy
    /// TTL. Returns false if any value failed to encode (nothing is written)
    /// or the L2 write failed.
    pub async fn batch_set<T, I>(&self, entries: I, ttl: Option<u64>) -> bool
    where
        T: CacheValue,
        I: IntoIterator<Item = (String, T)>,
    {
        let started = Instant::now();
        let stored = self.store_many(entries, ttl).await;
        self.inner.metrics.record_set(stored);
        self.inner.metrics.record_latency(started.elapsed());
        stored
    }

    async fn store_many<T, I>(&self, entries: I, ttl: Option<u64>) -> bool
    where
        T: CacheValue,
        I: IntoIterator<Item = (String, T)>,
    {
        let mut wire: Vec<SetEntry> = Vec::new();
        let mut native: Vec<(String, T, usize, u64)> = Vec::new();

        for (key, value) in entries {
            let policy = self.inner.policies.resolve(&key, None);
            let ttl = policy.effective_ttl(ttl);
            match self.inner.codec.encode(&value, policy) {
                Ok(bytes) => {
                    native.push((key.clone(), value, bytes.len(), ttl));
                    wire.push((key, bytes, ttl));
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "cannot encode value, batch rejected");
                    return false;
                }
            }
        }
        if wire.is_empty() {
            return true;
        }

        if let Err(e) = self.inner.l2.mset(wire).await {
            self.backend_failure("batch set", &format!("{} keys", native.len()), &e);
            let keys: Vec<&str> = native.iter().map(|(key, ..)| key.as_str()).collect();
            self.evict_written(&keys);
            return false;
        }

        let mut grouped: BTreeMap<String, (Vec<String>, u64)> = BTreeMap::new();
        for (key, value, size, ttl) in native {
            let policy = self.inner.policies.resolve(&key, None);
            for tag in &policy.invalidation_tags {
                let slot = grouped.entry(tag.clone()).or_insert_with(|| (Vec::new(), 0));
                slot.0.push(key.clone());
                slot.1 = slot.1.max(ttl);
            }
            self.inner.caps.unpin(&key);
            self.admit(
                &key,
                value,
                size,
                policy.max_entry_bytes,
                ttl.saturating_mul(1000),
                Admission::Write,
            );
        }

        if !grouped.is_empty() {
            if let Err(e) = self.inner.tags.register_many(grouped).await {
                self.backend_failure("tag register", "batch", &e);
            }
        }
        true
    }

    /// Deletes many keys from both tiers, returning how many L2 held.
    pub async fn batch_delete(&self, keys: &[String]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let removed = self.inner.l2.delete_many(keys).await;
        self.evict_written(keys);
        match removed {
            Ok(count) => count as usize,
            Err(e) => {
                self.backend_failure("batch delete", &format!("{} keys", keys.len()), &e);
                0
            }
        }
    }
}

