//! Invalidation Index
//!
//! Tag → set-of-keys mapping kept in L2 so every process sees the same view.
//! Each tag lives in its own set container whose expiry is pushed out to at
//! least the TTL of the longest-lived key registered under it.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::l2::L2Adapter;

#[derive(Clone)]
pub struct InvalidationIndex {
    l2: L2Adapter,
}

impl InvalidationIndex {
    pub fn new(l2: L2Adapter) -> Self {
        Self { l2 }
    }

    fn container(tag: &str) -> String {
        format!("tag:{tag}")
    }

    /// Registers `key` under every tag in `tags`.
    pub async fn register(&self, tags: &BTreeSet<String>, key: &str, ttl_seconds: u64) -> Result<()> {
        let members = [key.to_string()];
        for tag in tags {
            self.l2
                .set_add(&Self::container(tag), &members, ttl_seconds)
                .await?;
        }
        Ok(())
    }

    /// Registers many keys at once, one round trip per distinct tag.
    ///
    /// `grouped` maps tag → (keys, longest TTL among them).
    pub async fn register_many(&self, grouped: BTreeMap<String, (Vec<String>, u64)>) -> Result<()> {
        for (tag, (keys, ttl)) in grouped {
            self.l2.set_add(&Self::container(&tag), &keys, ttl).await?;
        }
        Ok(())
    }

    /// Snapshot of keys currently registered under `tag`.
    pub async fn members(&self, tag: &str) -> Result<Vec<String>> {
        self.l2.set_members(&Self::container(tag)).await
    }

    /// Removes `keys` from the tag's set.
    pub async fn unregister(&self, tag: &str, keys: &[String]) -> Result<()> {
        self.l2.set_remove(&Self::container(tag), keys).await
    }
}
