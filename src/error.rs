//! Error types for the cache
//!
//! Provides unified error handling using thiserror. The `CacheService` surface
//! never returns these to its callers; they travel between the L2 adapter, the
//! codec and the service, and are mapped to HTTP responses by the gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing store refused or dropped the connection
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    /// The backing store did not answer within the configured timeout
    #[error("Backing store timed out after {0} ms")]
    Timeout(u64),

    /// The backing store answered with an error
    #[error("Backing store error: {0}")]
    Backend(String),

    /// A value could not be encoded or decoded in its policy's format
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compressing or decompressing a payload failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// The stored payload carries an unknown or missing format marker
    #[error("Corrupt envelope: {0}")]
    CorruptEnvelope(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Returns true when the error means L2 could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::Unavailable(_) | CacheError::Timeout(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            CacheError::Unavailable(err.to_string())
        } else if err.is_timeout() {
            CacheError::Timeout(0)
        } else {
            CacheError::Backend(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Unavailable(_) | CacheError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
