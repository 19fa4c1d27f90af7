//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries L1 can hold
    pub l1_max_entries: usize,
    /// Estimated byte budget for L1 (sum of entry sizes)
    pub l1_max_bytes: usize,
    /// TTL in seconds for the built-in default policy
    pub default_ttl: u64,
    /// Redis connection URL; L2 runs in-process when unset
    pub redis_url: Option<String>,
    /// Maximum pooled Redis connections
    pub redis_pool_size: usize,
    /// Client-side timeout for every L2 call, in milliseconds
    pub l2_timeout_ms: u64,
    /// Prefix for every key written to L2
    pub namespace: String,
    /// Compressed payloads are kept only below this fraction of the raw size
    pub compression_threshold: f64,
    /// Payloads smaller than this are never compressed
    pub compression_min_bytes: usize,
    /// Zstd compression level
    pub zstd_level: i32,
    /// Upper bound on keys visited by one pattern invalidation
    pub scan_limit: usize,
    /// HTTP server port
    pub server_port: u16,
    /// L1 sweep interval in seconds
    pub cleanup_interval: u64,
    /// Optional JSON file describing the policy table
    pub policy_file: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `L1_MAX_ENTRIES` - Maximum L1 entries (default: 10000)
    /// - `L1_MAX_BYTES` - L1 byte budget (default: 64 MiB)
    /// - `DEFAULT_TTL` - Default policy TTL in seconds (default: 3600)
    /// - `REDIS_URL` - Redis URL (default: unset, in-process L2)
    /// - `REDIS_POOL_SIZE` - Pooled Redis connections (default: 16)
    /// - `L2_TIMEOUT_MS` - Per-call L2 timeout (default: 250)
    /// - `CACHE_NAMESPACE` - L2 key prefix (default: "cache")
    /// - `COMPRESSION_THRESHOLD` - Keep-compressed ratio (default: 0.9)
    /// - `COMPRESSION_MIN_BYTES` - Minimum size to try compression (default: 512)
    /// - `ZSTD_LEVEL` - Zstd level (default: 3)
    /// - `SCAN_LIMIT` - Max keys per pattern invalidation (default: 10000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - L1 sweep frequency in seconds (default: 30)
    /// - `CACHE_POLICY_FILE` - Path to a JSON policy table (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            l1_max_entries: env_or("L1_MAX_ENTRIES", defaults.l1_max_entries),
            l1_max_bytes: env_or("L1_MAX_BYTES", defaults.l1_max_bytes),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            redis_pool_size: env_or("REDIS_POOL_SIZE", defaults.redis_pool_size),
            l2_timeout_ms: env_or("L2_TIMEOUT_MS", defaults.l2_timeout_ms),
            namespace: env::var("CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            compression_threshold: env_or("COMPRESSION_THRESHOLD", defaults.compression_threshold),
            compression_min_bytes: env_or("COMPRESSION_MIN_BYTES", defaults.compression_min_bytes),
            zstd_level: env_or("ZSTD_LEVEL", defaults.zstd_level),
            scan_limit: env_or("SCAN_LIMIT", defaults.scan_limit),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            policy_file: env::var("CACHE_POLICY_FILE").ok().filter(|v| !v.is_empty()),
        }
    }

    /// Per-call L2 timeout as a Duration.
    pub fn l2_timeout(&self) -> Duration {
        Duration::from_millis(self.l2_timeout_ms)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            l1_max_entries: 10_000,
            l1_max_bytes: 64 * 1024 * 1024,
            default_ttl: 3600,
            redis_url: None,
            redis_pool_size: 16,
            l2_timeout_ms: 250,
            namespace: "cache".to_string(),
            compression_threshold: 0.9,
            compression_min_bytes: 512,
            zstd_level: 3,
            scan_limit: 10_000,
            server_port: 3000,
            cleanup_interval: 30,
            policy_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.l1_max_entries, 10_000);
        assert_eq!(config.default_ttl, 3600);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.namespace, "cache");
        assert!(config.redis_url.is_none());
        assert_eq!(config.l2_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("TIERCACHE_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("TIERCACHE_TEST_GARBAGE", 7usize), 7);
        env::remove_var("TIERCACHE_TEST_GARBAGE");
        assert_eq!(env_or("TIERCACHE_TEST_GARBAGE", 9u64), 9);
    }

    #[test]
    fn test_env_or_parses_float() {
        env::set_var("TIERCACHE_TEST_RATIO", "0.75");
        assert_eq!(env_or("TIERCACHE_TEST_RATIO", 0.9f64), 0.75);
        env::remove_var("TIERCACHE_TEST_RATIO");
    }
}
