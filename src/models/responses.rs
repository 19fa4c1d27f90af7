//! Response DTOs for the cache gateway
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheMetrics;
use crate::service::CacheSize;

/// Response body for GET /get/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for PUT /set and DELETE /del/:key
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    /// Human-readable outcome
    pub message: String,
    pub key: String,
}

impl MessageResponse {
    pub fn stored(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }

    pub fn deleted(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for GET /exists/:key
#[derive(Debug, Clone, Serialize)]
pub struct ExistsResponse {
    pub key: String,
    pub exists: bool,
}

/// Response body for POST /batch/get
///
/// Every requested key is present; misses map to `null`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchGetResponse {
    pub values: HashMap<String, Option<Value>>,
}

/// Response body for POST /batch/set
#[derive(Debug, Clone, Serialize)]
pub struct BatchSetResponse {
    pub stored: usize,
}

/// Response body for batch deletes and invalidations
#[derive(Debug, Clone, Serialize)]
pub struct RemovedResponse {
    /// Number of keys removed from L2
    pub removed: usize,
}

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub metrics: CacheMetrics,
    /// hits / total_requests, 0.0 before any request
    pub hit_rate: f64,
    pub l1_items: usize,
    pub l1_bytes: usize,
    /// Null when L2 could not be asked
    pub l2_items: Option<u64>,
}

impl StatsResponse {
    pub fn new(metrics: CacheMetrics, size: CacheSize) -> Self {
        Self {
            hit_rate: metrics.hit_rate(),
            metrics,
            l1_items: size.l1_items,
            l1_bytes: size.l1_bytes,
            l2_items: size.l2_items,
        }
    }
}

/// Response body for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" when L2 is unreachable
    pub status: String,
    pub l2_reachable: bool,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(l2_reachable: bool) -> Self {
        Self {
            status: if l2_reachable { "healthy" } else { "degraded" }.to_string(),
            l2_reachable,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
