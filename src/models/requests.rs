//! Request DTOs for the cache gateway
//!
//! Defines the structure of incoming HTTP request bodies. Values are carried
//! as arbitrary JSON and stored through the key's policy format.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::MAX_KEY_LENGTH;
use crate::policy::MAX_TTL_SECONDS;

/// Checks a single key, returning an error message if it is unusable.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {MAX_KEY_LENGTH} bytes"
        ));
    }
    None
}

fn validate_keys<'a>(keys: impl IntoIterator<Item = &'a String>) -> Option<String> {
    keys.into_iter().find_map(|k| validate_key(k))
}

fn validate_ttl(ttl: Option<u64>) -> Option<String> {
    match ttl {
        Some(ttl) if ttl > MAX_TTL_SECONDS => Some(format!(
            "TTL exceeds maximum of {MAX_TTL_SECONDS} seconds"
        )),
        _ => None,
    }
}

/// Request body for PUT /set
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds (policy TTL if not specified)
/// - `policy`: Optional explicit policy name
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub policy: Option<String>,
}

impl SetRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key).or_else(|| validate_ttl(self.ttl))
    }
}

/// Request body for POST /batch/get and POST /batch/delete
#[derive(Debug, Clone, Deserialize)]
pub struct KeysRequest {
    pub keys: Vec<String>,
}

impl KeysRequest {
    pub fn validate(&self) -> Option<String> {
        validate_keys(&self.keys)
    }
}

/// One entry of a batch write.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchEntry {
    pub key: String,
    pub value: Value,
}

/// Request body for POST /batch/set
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSetRequest {
    pub entries: Vec<BatchEntry>,
    /// Overrides every entry's policy TTL
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl BatchSetRequest {
    pub fn validate(&self) -> Option<String> {
        if self.entries.is_empty() {
            return Some("Batch cannot be empty".to_string());
        }
        validate_keys(self.entries.iter().map(|e| &e.key)).or_else(|| validate_ttl(self.ttl))
    }
}

/// Request body for POST /invalidate/pattern
#[derive(Debug, Clone, Deserialize)]
pub struct PatternRequest {
    pub pattern: String,
}

impl PatternRequest {
    pub fn validate(&self) -> Option<String> {
        if self.pattern.is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        None
    }
}
