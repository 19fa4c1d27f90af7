//! Cache Entry Module
//!
//! Defines the structure of an L1 entry: the decoded value plus the metadata
//! needed for expiry and byte accounting.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A decoded value as held in L1.
pub type NativeValue = Arc<dyn Any + Send + Sync>;

// == Cache Entry ==
/// Represents a single L1 entry with value and metadata.
#[derive(Clone)]
pub struct CacheEntry {
    /// The key this entry is stored under
    pub key: String,
    /// The decoded value
    pub value: NativeValue,
    /// Insertion timestamp (Unix milliseconds)
    pub inserted_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Encoded size of the value, used for the L1 byte budget
    pub approx_size_bytes: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry with optional TTL.
    ///
    /// # Arguments
    /// * `key` - The key the entry lives under
    /// * `value` - The decoded value
    /// * `approx_size_bytes` - Size of the encoded form
    /// * `ttl_ms` - Optional TTL in milliseconds
    pub fn new(
        key: impl Into<String>,
        value: NativeValue,
        approx_size_bytes: usize,
        ttl_ms: Option<u64>,
    ) -> Self {
        let now = current_timestamp_ms();
        let expires_at = ttl_ms.map(|ttl| now.saturating_add(ttl));

        Self {
            key: key.into(),
            value,
            inserted_at: now,
            expires_at,
            approx_size_bytes,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    /// Returns a typed clone of the value if it holds a `T`.
    pub fn downcast<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.value.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("inserted_at", &self.inserted_at)
            .field("expires_at", &self.expires_at)
            .field("approx_size_bytes", &self.approx_size_bytes)
            .finish_non_exhaustive()
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn native(s: &str) -> NativeValue {
        Arc::new(s.to_string())
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new("k", native("test_value"), 12, None);

        assert_eq!(entry.key, "k");
        assert_eq!(entry.downcast::<String>().as_deref(), Some("test_value"));
        assert_eq!(entry.approx_size_bytes, 12);
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_downcast_wrong_type() {
        let entry = CacheEntry::new("k", native("v"), 3, None);
        assert!(entry.downcast::<u64>().is_none());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new("k", native("v"), 3, Some(1_000));

        assert!(!entry.is_expired());
        sleep(Duration::from_millis(1100));
        assert!(entry.is_expired());
    }

    #[test]
    fn test_sub_second_ttl() {
        let entry = CacheEntry::new("k", native("v"), 3, Some(50));

        assert!(!entry.is_expired());
        sleep(Duration::from_millis(80));
        assert!(entry.is_expired());
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::new("k", native("v"), 3, Some(u64::MAX));

        assert_eq!(entry.expires_at, Some(u64::MAX));
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let entry = CacheEntry {
            key: "k".to_string(),
            value: native("v"),
            inserted_at: now,
            expires_at: Some(now),
            approx_size_bytes: 1,
        };

        assert!(entry.is_expired(), "Entry should be expired at boundary");
    }
}
