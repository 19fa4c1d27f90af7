//! Cache Service
//!
//! Orchestrates the policy registry, codec, L1 store, L2 adapter and
//! invalidation index behind a surface that never fails: backing-store and
//! (de)serialization errors are logged, counted and turned into the
//! documented fallback (miss, `false`, `0`).
//!
//! ## Write ordering
//!
//! L1 is only ever written after the matching L2 call has succeeded, and the
//! L1 lock is never held across an L2 round trip. Every write advances the
//! key's [`WriteFence`] under the L1 lock; a value read from L2 is admitted
//! to L1 only if no write to its key landed while the read was in flight, and
//! never for longer than L2 will keep it.

mod batch;
mod guard;

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheMetrics, L1Store, MetricsCollector};
use crate::codec::Codec;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::glob::glob_match;
use crate::l2::{L2Adapter, L2Store, MemoryStore, RedisStore};
use crate::policy::{CachePolicy, PolicyRegistry};
use crate::tags::InvalidationIndex;

use self::guard::{PinnedCaps, WriteFence};

/// Values the cache can hold: serializable, and clonable out of L1.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

// == Cache Size ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheSize {
    pub l1_items: usize,
    /// Sum of encoded sizes of L1 entries
    pub l1_bytes: usize,
    /// None when L2 could not be asked
    pub l2_items: Option<u64>,
}

/// Where a value offered to L1 came from.
#[derive(Debug, Clone, Copy)]
enum Admission {
    /// A value this call just wrote to L2
    Write,
    /// A value read from L2 after the key's fence showed `stamp`
    Read { stamp: u64 },
}

struct Inner {
    l1: Mutex<L1Store>,
    fence: WriteFence,
    caps: PinnedCaps,
    l2: L2Adapter,
    tags: InvalidationIndex,
    policies: PolicyRegistry,
    codec: Codec,
    metrics: MetricsCollector,
    scan_limit: usize,
}

/// Two-tier cache handle. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

impl CacheService {
    // == Constructors ==
    /// Creates a service over `store` with the limits from `config`.
    pub fn new(config: &Config, store: Arc<dyn L2Store>, policies: PolicyRegistry) -> Self {
        let l2 = L2Adapter::new(store, config.namespace.clone(), config.l2_timeout());
        Self {
            inner: Arc::new(Inner {
                l1: Mutex::new(L1Store::new(config.l1_max_entries, config.l1_max_bytes)),
                fence: WriteFence::new(),
                caps: PinnedCaps::new(),
                tags: InvalidationIndex::new(l2.clone()),
                l2,
                policies,
                codec: Codec::new(
                    config.compression_threshold,
                    config.compression_min_bytes,
                    config.zstd_level,
                ),
                metrics: MetricsCollector::new(),
                scan_limit: config.scan_limit,
            }),
        }
    }

    /// Builds the L2 store and policy table described by `config`.
    ///
    /// Uses Redis when `redis_url` is set and an in-process store otherwise;
    /// loads the policy file when given, else the platform policies.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn L2Store> = match &config.redis_url {
            Some(url) => Arc::new(RedisStore::connect(
                url,
                config.redis_pool_size,
                config.l2_timeout(),
            )?),
            None => {
                info!("REDIS_URL not set, using in-process L2 store");
                Arc::new(MemoryStore::new())
            }
        };

        let policies = match &config.policy_file {
            Some(path) => PolicyRegistry::from_file(path)?,
            None => PolicyRegistry::platform_defaults(config.default_ttl),
        };

        Ok(Self::new(config, store, policies))
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.inner.policies
    }

    // == Get ==
    /// Returns the cached value for `key`, or None on miss.
    ///
    /// L2 failures and undecodable payloads count as misses; a payload that
    /// fails to decode is deleted so it cannot fail again.
    pub async fn get<T: CacheValue>(&self, key: &str) -> Option<T> {
        let started = Instant::now();
        let value = self.lookup::<T>(key).await;

        if value.is_some() {
            self.inner.metrics.record_hit();
        } else {
            debug!(key = %key, "cache miss");
            self.inner.metrics.record_miss();
        }
        self.inner.metrics.record_latency(started.elapsed());
        value
    }

    /// Returns the cached value for `key`, or `default` on miss.
    pub async fn get_or<T: CacheValue>(&self, key: &str, default: T) -> T {
        self.get(key).await.unwrap_or(default)
    }

    async fn lookup<T: CacheValue>(&self, key: &str) -> Option<T> {
        if let Some(value) = self.l1_get::<T>(key) {
            debug!(key = %key, "cache hit (L1)");
            return Some(value);
        }

        let stamp = self.inner.fence.observe(key);
        let stored = match self.inner.l2.get(key).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                self.backend_failure("get", key, &e);
                return None;
            }
        };

        match self.inner.codec.decode::<T>(&stored.bytes) {
            Ok(value) => {
                debug!(key = %key, "cache hit (L2)");
                let policy = self.inner.policies.resolve(key, None);
                self.admit(
                    key,
                    value.clone(),
                    stored.bytes.len(),
                    self.read_cap(key, policy),
                    read_ttl_ms(policy, stored.ttl_ms),
                    Admission::Read { stamp },
                );
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "undecodable cache entry, purging");
                self.purge(key).await;
                None
            }
        }
    }

    fn l1_get<T: CacheValue>(&self, key: &str) -> Option<T> {
        let mut l1 = self.inner.l1.lock();
        l1.get(key).and_then(|entry| entry.downcast::<T>())
    }

    // == Set ==
    /// Stores `value` under `key`.
    ///
    /// `ttl` overrides the policy TTL; `policy_name` overrides key-pattern
    /// resolution. Returns true only if the L2 write succeeded.
    pub async fn set<T: CacheValue>(
        &self,
        key: &str,
        value: T,
        ttl: Option<u64>,
        policy_name: Option<&str>,
    ) -> bool {
        let started = Instant::now();
        let stored = self.store(key, value, ttl, policy_name).await;
        self.inner.metrics.record_set(stored);
        self.inner.metrics.record_latency(started.elapsed());
        stored
    }

    async fn store<T: CacheValue>(
        &self,
        key: &str,
        value: T,
        ttl: Option<u64>,
        policy_name: Option<&str>,
    ) -> bool {
        let policy = self.inner.policies.resolve(key, policy_name);
        let ttl = policy.effective_ttl(ttl);

        let bytes = match self.inner.codec.encode(&value, policy) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, policy = %policy.name, error = %e, "cannot encode value");
                return false;
            }
        };

        if let Err(e) = self.inner.l2.set(key, &bytes, ttl).await {
            self.backend_failure("set", key, &e);
            // An older L1 copy may no longer match L2.
            self.evict_written(&[key]);
            return false;
        }

        if policy_name.is_some() {
            self.pin_cap(key, policy, ttl);
        } else {
            self.inner.caps.unpin(key);
        }
        self.admit(
            key,
            value,
            bytes.len(),
            policy.max_entry_bytes,
            ttl.saturating_mul(1000),
            Admission::Write,
        );

        if !policy.invalidation_tags.is_empty() {
            if let Err(e) = self
                .inner
                .tags
                .register(&policy.invalidation_tags, key, ttl)
                .await
            {
                self.backend_failure("tag register", key, &e);
            }
        }

        debug!(key = %key, ttl, size = bytes.len(), policy = %policy.name, "cache set");
        true
    }

    /// Remembers the cap of an explicit policy that is stricter than the one
    /// the key pattern resolves to, so later L2 reads honour it too.
    fn pin_cap(&self, key: &str, policy: &CachePolicy, ttl: u64) {
        let pattern_cap = self.inner.policies.resolve(key, None).max_entry_bytes;
        match policy.max_entry_bytes {
            Some(cap) if pattern_cap.map_or(true, |p| cap < p) => self.inner.caps.pin(key, cap, ttl),
            _ => self.inner.caps.unpin(key),
        }
    }

    /// Size cap for a value read back from L2.
    fn read_cap(&self, key: &str, policy: &CachePolicy) -> Option<usize> {
        match (policy.max_entry_bytes, self.inner.caps.get(key)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Offers a decoded value to L1, honouring the size cap.
    fn admit<T: CacheValue>(
        &self,
        key: &str,
        value: T,
        size: usize,
        cap: Option<usize>,
        ttl_ms: u64,
        origin: Admission,
    ) {
        let mut l1 = self.inner.l1.lock();
        match origin {
            Admission::Write => self.inner.fence.advance(key),
            Admission::Read { stamp } => {
                if !self.inner.fence.unchanged(key, stamp) {
                    debug!(key = %key, "key written during L2 read, not admitting");
                    return;
                }
            }
        }
        if cap.is_some_and(|max| size > max) {
            l1.remove(key);
            debug!(key = %key, size, "entry exceeds L1 size cap, served from L2 only");
            return;
        }
        if ttl_ms == 0 {
            l1.remove(key);
            return;
        }
        let outcome = l1.insert(key, Arc::new(value), size, Some(ttl_ms));
        drop(l1);
        self.inner.metrics.record_evictions(outcome.evicted);
    }

    /// Drops keys from L1 after a write to L2, fencing out in-flight reads.
    fn evict_written<K: AsRef<str>>(&self, keys: &[K]) {
        let mut l1 = self.inner.l1.lock();
        for key in keys {
            let key: &str = key.as_ref();
            self.inner.fence.advance(key);
            l1.remove(key);
        }
        drop(l1);
        for key in keys {
            self.inner.caps.unpin(key.as_ref());
        }
    }

    // == Delete ==
    /// Removes `key` from both tiers. False only if the L2 call failed.
    pub async fn delete(&self, key: &str) -> bool {
        let result = self.inner.l2.delete(key).await;
        self.evict_written(&[key]);
        match result {
            Ok(_) => true,
            Err(e) => {
                self.backend_failure("delete", key, &e);
                false
            }
        }
    }

    // == Exists ==
    pub async fn exists(&self, key: &str) -> bool {
        let in_l1 = self.inner.l1.lock().contains(key);
        if in_l1 {
            return true;
        }
        match self.inner.l2.exists(key).await {
            Ok(found) => found,
            Err(e) => {
                self.backend_failure("exists", key, &e);
                false
            }
        }
    }

    // == Invalidation ==
    /// Deletes every key registered under `tag`, returning how many L2 held.
    ///
    /// Works on the snapshot of keys registered when the call starts; keys
    /// registered concurrently stay in the index.
    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        let keys = match self.inner.tags.members(tag).await {
            Ok(keys) => keys,
            Err(e) => {
                self.backend_failure("tag members", tag, &e);
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }

        let removed = self.inner.l2.delete_many(&keys).await;
        self.evict_written(&keys);

        match removed {
            Ok(count) => {
                if let Err(e) = self.inner.tags.unregister(tag, &keys).await {
                    self.backend_failure("tag unregister", tag, &e);
                }
                info!(tag = %tag, keys = keys.len(), removed = count, "invalidated by tag");
                count as usize
            }
            Err(e) => {
                self.backend_failure("invalidate tag", tag, &e);
                0
            }
        }
    }

    /// Deletes every key matching the glob `pattern` from both tiers.
    ///
    /// The L2 scan visits at most `scan_limit` keys.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        let scanned = self.inner.l2.scan(pattern, self.inner.scan_limit).await;

        let removed = match &scanned {
            Ok(keys) => self.inner.l2.delete_many(keys).await,
            Err(_) => Ok(0),
        };
        let local = {
            let mut l1 = self.inner.l1.lock();
            self.inner.fence.advance_all();
            l1.remove_where(|key| glob_match(pattern, key))
        };
        self.inner.caps.unpin_where(|key| glob_match(pattern, key));

        match (scanned, removed) {
            (Ok(keys), Ok(count)) => {
                info!(pattern = %pattern, scanned = keys.len(), removed = count, local, "invalidated by pattern");
                count as usize
            }
            (Err(e), _) | (_, Err(e)) => {
                self.backend_failure("invalidate pattern", pattern, &e);
                0
            }
        }
    }

    /// Deletes a bad entry from both tiers.
    async fn purge(&self, key: &str) {
        self.evict_written(&[key]);
        if let Err(e) = self.inner.l2.delete(key).await {
            self.backend_failure("purge", key, &e);
        }
    }

    // == Introspection ==
    pub fn metrics(&self) -> CacheMetrics {
        self.inner.metrics.snapshot()
    }

    pub fn hit_rate(&self) -> f64 {
        self.inner.metrics.hit_rate()
    }

    /// L1 item count and byte estimate, plus the number of values L2 holds
    /// under this namespace.
    pub async fn cache_size(&self) -> CacheSize {
        let (l1_items, l1_bytes) = {
            let l1 = self.inner.l1.lock();
            (l1.len(), l1.bytes())
        };
        let l2_items = match self.inner.l2.len().await {
            Ok(n) => Some(n),
            Err(e) => {
                self.backend_failure("size", "*", &e);
                None
            }
        };
        CacheSize {
            l1_items,
            l1_bytes,
            l2_items,
        }
    }

    /// Whether L2 answers within the timeout.
    pub async fn ping(&self) -> bool {
        self.inner.l2.ping().await.is_ok()
    }

    /// Drops expired L1 entries, returning how many were removed.
    pub fn purge_expired_local(&self) -> usize {
        let purged = self.inner.l1.lock().cleanup_expired();
        self.inner.caps.cleanup_expired();
        purged
    }

    /// Drops `key` from L1 only; L2 keeps its copy.
    pub fn evict_local(&self, key: &str) -> bool {
        self.inner.l1.lock().remove(key)
    }

    fn backend_failure(&self, op: &'static str, key: &str, err: &CacheError) {
        self.inner.metrics.record_backend_error();
        warn!(op, key = %key, error = %err, "L2 call failed, degrading");
    }
}

/// L1 lifetime of a value read from L2: the policy TTL, but never past the
/// time L2 has left on the entry.
fn read_ttl_ms(policy: &CachePolicy, remaining_ms: Option<u64>) -> u64 {
    let policy_ms = policy.effective_ttl(None).saturating_mul(1000);
    remaining_ms.map_or(policy_ms, |remaining| remaining.min(policy_ms))
}
