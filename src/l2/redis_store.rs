//! Redis-backed L2 store over a deadpool connection pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};

use super::{L2Store, L2Value, SetEntry};
use crate::error::{CacheError, Result};

/// Keys requested per SCAN page.
const SCAN_PAGE: usize = 500;

#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds a pool for `url`, bounding connection waits by `timeout`.
    pub fn connect(url: &str, pool_size: usize, timeout: Duration) -> Result<Self> {
        let mut config = deadpool_redis::Config::from_url(url);
        let mut pool_config = config.pool.take().unwrap_or_default();
        pool_config.max_size = pool_size;
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
        config.pool = Some(pool_config);

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        info!(url = %url, pool_size, "redis pool created");
        Ok(Self::new(pool))
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

/// Reads a PTTL reply: -1 means no expiry, -2 means the key vanished.
fn remaining_ms(pttl: i64) -> Option<u64> {
    match pttl {
        -1 => None,
        ms => Some(u64::try_from(ms).unwrap_or(0)),
    }
}

fn expire_seconds(ttl_seconds: u64) -> i64 {
    i64::try_from(ttl_seconds.max(1)).unwrap_or(i64::MAX)
}

#[async_trait]
impl L2Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<L2Value>> {
        let mut conn = self.conn().await?;
        let (value, pttl): (Option<Vec<u8>>, i64) = redis::pipe()
            .get(key)
            .pttl(key)
            .query_async(&mut conn)
            .await?;
        Ok(value.map(|bytes| L2Value::new(bytes, remaining_ms(pttl))))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, ttl_seconds.max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<L2Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.cmd("MGET").arg(keys);
        for key in keys {
            pipe.pttl(key);
        }
        let replies: Vec<redis::Value> = pipe.query_async(&mut conn).await?;

        let mut replies = replies.iter();
        let values: Vec<Option<Vec<u8>>> = match replies.next() {
            Some(reply) => redis::from_redis_value(reply)?,
            None => return Err(CacheError::Backend("empty MGET pipeline reply".to_string())),
        };
        let ttls = replies
            .map(|reply| redis::from_redis_value::<i64>(reply))
            .collect::<redis::RedisResult<Vec<i64>>>()?;
        if ttls.len() != values.len() {
            return Err(CacheError::Backend(format!(
                "PTTL returned {} replies for {} keys",
                ttls.len(),
                values.len()
            )));
        }

        Ok(values
            .into_iter()
            .zip(ttls)
            .map(|(value, pttl)| value.map(|bytes| L2Value::new(bytes, remaining_ms(pttl))))
            .collect())
    }

    async fn mset(&self, entries: &[SetEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value, ttl) in entries {
            pipe.set_ex(key, value.as_slice(), (*ttl).max(1)).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(count = entries.len(), "pipelined multi-set");
        Ok(())
    }

    async fn scan(&self, pattern: &str, limit: usize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 || keys.len() >= limit {
                break;
            }
        }

        keys.truncate(limit);
        Ok(keys)
    }

    async fn set_add(&self, set_key: &str, members: &[String], ttl_seconds: u64) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let wanted = expire_seconds(ttl_seconds);

        let (_, current): (i64, i64) = redis::pipe()
            .sadd(set_key, members)
            .ttl(set_key)
            .query_async(&mut conn)
            .await?;
        // -1 means no expiry yet; -2 cannot happen right after SADD.
        if current < wanted {
            let _: bool = conn.expire(set_key, wanted).await?;
        }
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn.smembers(set_key).await?;
        Ok(members)
    }

    async fn set_remove(&self, set_key: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let _: u64 = conn.srem(set_key, members).await?;
        Ok(())
    }

    async fn count(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut total: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE)
                .query_async(&mut conn)
                .await?;
            total += batch.len() as u64;
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(total)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
