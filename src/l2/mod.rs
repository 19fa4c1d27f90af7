//! L2 Adapter
//!
//! Thin client over the shared key-value tier. [`L2Store`] is the contract a
//! backing store fulfils; [`L2Adapter`] namespaces keys and bounds every call
//! with a client-side timeout so a stalled store degrades instead of blocking.
//!
//! ## Key layout
//!
//! ```text
//! {namespace}:{key}        cached value envelope
//! {namespace}#tag:{tag}    SET of keys registered under tag
//! ```

mod memory;
mod redis_store;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, Result};

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// One entry of a pipelined multi-set: (key, payload, ttl seconds).
pub type SetEntry = (String, Vec<u8>, u64);

/// A stored payload and the time it has left to live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Value {
    pub bytes: Vec<u8>,
    /// Remaining lifetime in milliseconds, None when the key never expires
    pub ttl_ms: Option<u64>,
}

impl L2Value {
    pub fn new(bytes: Vec<u8>, ttl_ms: Option<u64>) -> Self {
        Self { bytes, ttl_ms }
    }
}

// == Store Contract ==
/// Operations the cache needs from a networked key-value store.
///
/// Keys are passed through verbatim; namespacing is the adapter's job.
#[async_trait]
pub trait L2Store: Send + Sync {
    /// Value and remaining TTL, read in one round trip.
    async fn get(&self, key: &str) -> Result<Option<L2Value>>;

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Returns how many of the keys existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// One round trip; the result is positionally aligned with `keys`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<L2Value>>>;

    /// One pipelined round trip; fails as a whole.
    async fn mset(&self, entries: &[SetEntry]) -> Result<()>;

    /// Keys matching a glob, at most `limit` of them.
    async fn scan(&self, pattern: &str, limit: usize) -> Result<Vec<String>>;

    /// Adds members to a set and extends its expiry to at least `ttl_seconds`.
    async fn set_add(&self, set_key: &str, members: &[String], ttl_seconds: u64) -> Result<()>;

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>>;

    async fn set_remove(&self, set_key: &str, members: &[String]) -> Result<()>;

    /// Number of live keys matching a glob.
    async fn count(&self, pattern: &str) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

// == Adapter ==
#[derive(Clone)]
pub struct L2Adapter {
    store: Arc<dyn L2Store>,
    namespace: String,
    timeout: Duration,
}

impl L2Adapter {
    pub fn new(store: Arc<dyn L2Store>, namespace: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            timeout,
        }
    }

    fn data_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn data_keys(&self, keys: &[String]) -> Vec<String> {
        keys.iter().map(|k| self.data_key(k)).collect()
    }

    fn container_key(&self, name: &str) -> String {
        format!("{}#{}", self.namespace, name)
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<L2Value>> {
        self.timed(self.store.get(&self.data_key(key))).await
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<()> {
        self.timed(self.store.set(&self.data_key(key), value, ttl_seconds))
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.timed(self.store.delete(&self.data_key(key))).await
    }

    pub async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.timed(self.store.delete_many(&self.data_keys(keys)))
            .await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.timed(self.store.exists(&self.data_key(key))).await
    }

    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<L2Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values = self.timed(self.store.mget(&self.data_keys(keys))).await?;
        if values.len() != keys.len() {
            return Err(CacheError::Backend(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }
        Ok(values)
    }

    pub async fn mset(&self, entries: Vec<SetEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let entries: Vec<SetEntry> = entries
            .into_iter()
            .map(|(k, v, ttl)| (self.data_key(&k), v, ttl))
            .collect();
        self.timed(self.store.mset(&entries)).await
    }

    /// Cache keys (without namespace) matching `pattern`.
    pub async fn scan(&self, pattern: &str, limit: usize) -> Result<Vec<String>> {
        let prefix = format!("{}:", self.namespace);
        let keys = self
            .timed(self.store.scan(&self.data_key(pattern), limit))
            .await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    pub async fn set_add(&self, name: &str, members: &[String], ttl_seconds: u64) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        self.timed(
            self.store
                .set_add(&self.container_key(name), members, ttl_seconds),
        )
        .await
    }

    pub async fn set_members(&self, name: &str) -> Result<Vec<String>> {
        self.timed(self.store.set_members(&self.container_key(name)))
            .await
    }

    pub async fn set_remove(&self, name: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        self.timed(self.store.set_remove(&self.container_key(name), members))
            .await
    }

    /// Cached values held under this namespace; tag containers are not counted.
    pub async fn len(&self) -> Result<u64> {
        self.timed(self.store.count(&self.data_key("*"))).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.timed(self.store.ping()).await
    }
}
