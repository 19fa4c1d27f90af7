//! Cache-aside wrapper
//!
//! Wraps a value-producing function so that repeated calls with the same
//! derived key are answered from the cache instead of re-running it.
//!
//! ```ignore
//! let load_profile = cache
//!     .cached(|id: &u64| format!("user_profile:{id}"), |id| async move { fetch(id).await })
//!     .ttl(600);
//! let profile = load_profile.call(42).await;
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use tracing::debug;

use crate::service::{CacheService, CacheValue};

type KeyFn<A> = Arc<dyn Fn(&A) -> String + Send + Sync>;
type Producer<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, T> + Send + Sync>;

/// A producer function fronted by the cache.
pub struct CachedFn<A, T> {
    cache: CacheService,
    key_fn: KeyFn<A>,
    producer: Producer<A, T>,
    ttl: Option<u64>,
    policy: Option<String>,
    invocations: Arc<AtomicU64>,
}

impl<A, T> Clone for CachedFn<A, T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key_fn: Arc::clone(&self.key_fn),
            producer: Arc::clone(&self.producer),
            ttl: self.ttl,
            policy: self.policy.clone(),
            invocations: Arc::clone(&self.invocations),
        }
    }
}

impl<A, T> CachedFn<A, T>
where
    A: Send + 'static,
    T: CacheValue,
{
    /// Overrides the policy TTL for values this wrapper stores.
    pub fn ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl = Some(ttl_seconds);
        self
    }

    /// Stores values under an explicitly named policy.
    pub fn policy(mut self, name: impl Into<String>) -> Self {
        self.policy = Some(name.into());
        self
    }

    /// Returns the cached value for `args`, running the producer on a miss.
    pub async fn call(&self, args: A) -> T {
        let key = (self.key_fn)(&args);
        if let Some(hit) = self.cache.get::<T>(&key).await {
            return hit;
        }

        self.invocations.fetch_add(1, Ordering::Relaxed);
        let value = (self.producer)(args).await;
        if !self
            .cache
            .set(&key, value.clone(), self.ttl, self.policy.as_deref())
            .await
        {
            debug!(key = %key, "computed value not cached");
        }
        value
    }

    /// How many times the producer has run across all clones.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

impl CacheService {
    /// Wraps an async producer. Cache lookups and writes are awaited, so no
    /// executor thread blocks on L2.
    pub fn cached<A, T, K, F, Fut>(&self, key_fn: K, producer: F) -> CachedFn<A, T>
    where
        A: Send + 'static,
        T: CacheValue,
        K: Fn(&A) -> String + Send + Sync + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.wrap(Arc::new(key_fn), Arc::new(move |args| producer(args).boxed()))
    }

    /// Wraps a synchronous producer; it runs inline on the calling task.
    pub fn cached_sync<A, T, K, F>(&self, key_fn: K, producer: F) -> CachedFn<A, T>
    where
        A: Send + 'static,
        T: CacheValue,
        K: Fn(&A) -> String + Send + Sync + 'static,
        F: Fn(A) -> T + Send + Sync + 'static,
    {
        self.wrap(
            Arc::new(key_fn),
            Arc::new(move |args| future::ready(producer(args)).boxed()),
        )
    }

    fn wrap<A, T>(&self, key_fn: KeyFn<A>, producer: Producer<A, T>) -> CachedFn<A, T> {
        CachedFn {
            cache: self.clone(),
            key_fn,
            producer,
            ttl: None,
            policy: None,
            invocations: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::l2::MemoryStore;
    use crate::policy::PolicyRegistry;
    use std::time::Duration;

    fn cache() -> (CacheService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = Config {
            l2_timeout_ms: 100,
            ..Config::default()
        };
        let cache = CacheService::new(&config, store.clone(), PolicyRegistry::platform_defaults(3600));
        (cache, store)
    }

    #[tokio::test]
    async fn test_producer_runs_once_per_key() {
        let (cache, _) = cache();
        let square = cache.cached(
            |n: &u64| format!("square:{n}"),
            |n: u64| async move { n * n },
        );

        assert_eq!(square.call(4).await, 16);
        assert_eq!(square.call(4).await, 16);
        assert_eq!(square.call(5).await, 25);
        assert_eq!(square.invocations(), 2);
    }

    #[tokio::test]
    async fn test_sync_producer() {
        let (cache, _) = cache();
        let greet = cache.cached_sync(
            |name: &String| format!("greet:{name}"),
            |name: String| format!("hello {name}"),
        );

        assert_eq!(greet.call("ada".to_string()).await, "hello ada");
        assert_eq!(greet.call("ada".to_string()).await, "hello ada");
        assert_eq!(greet.invocations(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_cache_and_counter() {
        let (cache, _) = cache();
        let f = cache.cached_sync(|n: &u32| format!("n:{n}"), |n: u32| n + 1);
        let g = f.clone();

        assert_eq!(f.call(1).await, 2);
        assert_eq!(g.call(1).await, 2);
        assert_eq!(g.invocations(), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_reruns_producer() {
        let (cache, _) = cache();
        let f = cache
            .cached_sync(|n: &u32| format!("t:{n}"), |n: u32| n)
            .ttl(1);

        f.call(1).await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        f.call(1).await;
        assert_eq!(f.invocations(), 2);
    }

    #[tokio::test]
    async fn test_invalidation_reruns_producer() {
        let (cache, _) = cache();
        let f = cache
            .cached_sync(|id: &u32| format!("profile-{id}"), |id: u32| id * 10)
            .policy("user_profile");

        f.call(7).await;
        assert_eq!(cache.invalidate_by_tag("profiles").await, 1);
        f.call(7).await;
        assert_eq!(f.invocations(), 2);
    }

    #[tokio::test]
    async fn test_outage_still_returns_computed_value() {
        let (cache, store) = cache();
        store.set_available(false);
        let f = cache.cached_sync(|n: &u32| format!("o:{n}"), |n: u32| n * 3);

        assert_eq!(f.call(3).await, 9);
        assert_eq!(f.call(3).await, 9);
        assert_eq!(f.invocations(), 2);
    }
}
