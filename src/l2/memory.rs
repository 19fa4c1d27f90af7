//! In-process L2 store.
//!
//! Honours the same contract as Redis (TTL, sets with expiry, glob scans) so
//! the service can run without a Redis deployment, and exposes outage and
//! latency switches for exercising degradation paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{L2Store, L2Value, SetEntry};
use crate::error::{CacheError, Result};
use crate::glob::glob_match;

#[derive(Debug)]
enum Slot {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

#[derive(Debug)]
struct Stored {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Stored {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }

    fn ttl_ms(&self, now: Instant) -> Option<u64> {
        self.expires_at
            .map(|at| u64::try_from(at.saturating_duration_since(now).as_millis()).unwrap_or(u64::MAX))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Stored>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of round trips served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Overwrites a raw value, bypassing the cache envelope.
    pub fn put_raw(&self, key: &str, value: Vec<u8>) {
        self.data.lock().insert(
            key.to_string(),
            Stored {
                slot: Slot::Bytes(value),
                expires_at: None,
            },
        );
    }

    async fn round_trip(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    /// Expiry instant for a TTL; a TTL past what `Instant` can represent never expires.
    fn expiry(now: Instant, ttl_seconds: u64) -> Option<Instant> {
        now.checked_add(Duration::from_secs(ttl_seconds.max(1)))
    }

    fn live_value(data: &mut HashMap<String, Stored>, key: &str) -> Option<L2Value> {
        let now = Instant::now();
        let live = data.get(key).map(|s| s.is_live(now))?;
        if !live {
            data.remove(key);
            return None;
        }
        let stored = data.get(key)?;
        match &stored.slot {
            Slot::Bytes(bytes) => Some(L2Value::new(bytes.clone(), stored.ttl_ms(now))),
            Slot::Set(_) => None,
        }
    }

    fn remove_live(data: &mut HashMap<String, Stored>, key: &str) -> bool {
        let now = Instant::now();
        data.remove(key).is_some_and(|s| s.is_live(now))
    }
}

#[async_trait]
impl L2Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<L2Value>> {
        self.round_trip().await?;
        Ok(Self::live_value(&mut self.data.lock(), key))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<()> {
        self.round_trip().await?;
        self.data.lock().insert(
            key.to_string(),
            Stored {
                slot: Slot::Bytes(value.to_vec()),
                expires_at: Self::expiry(Instant::now(), ttl_seconds),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.round_trip().await?;
        Ok(Self::remove_live(&mut self.data.lock(), key))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        self.round_trip().await?;
        let mut data = self.data.lock();
        Ok(keys
            .iter()
            .filter(|k| Self::remove_live(&mut data, k))
            .count() as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.round_trip().await?;
        let now = Instant::now();
        Ok(self
            .data
            .lock()
            .get(key)
            .is_some_and(|s| s.is_live(now)))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<L2Value>>> {
        self.round_trip().await?;
        let mut data = self.data.lock();
        Ok(keys.iter().map(|k| Self::live_value(&mut data, k)).collect())
    }

    async fn mset(&self, entries: &[SetEntry]) -> Result<()> {
        self.round_trip().await?;
        let now = Instant::now();
        let mut data = self.data.lock();
        for (key, value, ttl) in entries {
            data.insert(
                key.clone(),
                Stored {
                    slot: Slot::Bytes(value.clone()),
                    expires_at: Self::expiry(now, *ttl),
                },
            );
        }
        Ok(())
    }

    async fn scan(&self, pattern: &str, limit: usize) -> Result<Vec<String>> {
        self.round_trip().await?;
        let now = Instant::now();
        let data = self.data.lock();
        Ok(data
            .iter()
            .filter(|(_, s)| s.is_live(now))
            .map(|(k, _)| k)
            .filter(|k| glob_match(pattern, k))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_add(&self, set_key: &str, members: &[String], ttl_seconds: u64) -> Result<()> {
        self.round_trip().await?;
        let now = Instant::now();
        let wanted = Self::expiry(now, ttl_seconds);
        let mut data = self.data.lock();

        let stored = data.entry(set_key.to_string()).or_insert_with(|| Stored {
            slot: Slot::Set(HashSet::new()),
            expires_at: wanted,
        });
        if !stored.is_live(now) || !matches!(stored.slot, Slot::Set(_)) {
            *stored = Stored {
                slot: Slot::Set(HashSet::new()),
                expires_at: wanted,
            };
        }
        if let Slot::Set(set) = &mut stored.slot {
            set.extend(members.iter().cloned());
        }
        // no expiry on either side means the set never expires
        stored.expires_at = match (stored.expires_at, wanted) {
            (Some(current), Some(wanted)) => Some(current.max(wanted)),
            _ => None,
        };
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>> {
        self.round_trip().await?;
        let now = Instant::now();
        let data = self.data.lock();
        Ok(match data.get(set_key) {
            Some(Stored {
                slot: Slot::Set(set),
                expires_at,
            }) if expires_at.map_or(true, |at| at > now) => set.iter().cloned().collect(),
            _ => Vec::new(),
        })
    }

    async fn set_remove(&self, set_key: &str, members: &[String]) -> Result<()> {
        self.round_trip().await?;
        let mut data = self.data.lock();
        let emptied = match data.get_mut(set_key) {
            Some(Stored {
                slot: Slot::Set(set),
                ..
            }) => {
                for m in members {
                    set.remove(m);
                }
                set.is_empty()
            }
            _ => false,
        };
        if emptied {
            data.remove(set_key);
        }
        Ok(())
    }

    async fn count(&self, pattern: &str) -> Result<u64> {
        self.round_trip().await?;
        let now = Instant::now();
        Ok(self
            .data
            .lock()
            .iter()
            .filter(|(k, s)| s.is_live(now) && glob_match(pattern, k))
            .count() as u64)
    }

    async fn ping(&self) -> Result<()> {
        self.round_trip().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", b"v", 60).await.unwrap();

        let value = store.get("k").await.unwrap().unwrap();
        assert_eq!(value.bytes, b"v".to_vec());
        assert!(value.ttl_ms.is_some_and(|ms| ms > 59_000 && ms <= 60_000));
        assert!(store.exists("k").await.unwrap());
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store.set("k", b"v", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_mget_mset_alignment() {
        let store = MemoryStore::new();
        store
            .mset(&[
                ("a".to_string(), b"1".to_vec(), 60),
                ("c".to_string(), b"3".to_vec(), 60),
            ])
            .await
            .unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values: Vec<Option<Vec<u8>>> = store
            .mget(&keys)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.map(|v| v.bytes))
            .collect();
        assert_eq!(values, vec![Some(b"1".to_vec()), None, Some(b"3".to_vec())]);
    }

    #[tokio::test]
    async fn test_set_add_extends_but_never_shortens_expiry() {
        let store = MemoryStore::new();
        store.set_add("t", &["a".to_string()], 1).await.unwrap();
        store.set_add("t", &["b".to_string()], 60).await.unwrap();
        store.set_add("t", &["c".to_string()], 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let mut members = store.set_members("t").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_raw_values_never_expire() {
        let store = MemoryStore::new();
        store.put_raw("k", b"v".to_vec());
        assert_eq!(store.get("k").await.unwrap().unwrap().ttl_ms, None);
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let store = MemoryStore::new();
        store.set("k", b"v", u64::MAX).await.unwrap();
        store.set_add("t", &["k".to_string()], u64::MAX).await.unwrap();
        store.set_add("t", &["j".to_string()], 1).await.unwrap();

        assert!(store.get("k").await.unwrap().is_some());
        assert_eq!(store.set_members("t").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_remove_drops_empty_set() {
        let store = MemoryStore::new();
        store.set_add("t", &["a".to_string()], 60).await.unwrap();
        store.set_remove("t", &["a".to_string()]).await.unwrap();

        assert!(!store.exists("t").await.unwrap());
        assert!(store.set_members("t").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outage_switch() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(store.ping().await.is_err());
        store.set_available(true);
        assert!(store.ping().await.is_ok());
        assert_eq!(store.calls(), 2);
    }
}
