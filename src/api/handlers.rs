//! API Handlers
//!
//! HTTP request handlers for each gateway endpoint. Handlers validate their
//! input, call into the `CacheService` and translate its fallback values
//! (miss, `false`) into HTTP errors.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::warn;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, BatchGetResponse, BatchSetRequest, BatchSetResponse, ExistsResponse,
    GetResponse, HealthResponse, KeysRequest, MessageResponse, PatternRequest, RemovedResponse,
    SetRequest, StatsResponse,
};
use crate::service::CacheService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheService,
}

impl AppState {
    pub fn new(cache: CacheService) -> Self {
        Self { cache }
    }

    /// Builds the cache service described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(CacheService::from_config(config)?))
    }
}

fn check(problem: Option<String>) -> Result<()> {
    match problem {
        Some(msg) => {
            warn!(reason = %msg, "rejected request");
            Err(CacheError::InvalidRequest(msg))
        }
        None => Ok(()),
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<MessageResponse>> {
    check(req.validate())?;

    if !state
        .cache
        .set(&req.key, req.value, req.ttl, req.policy.as_deref())
        .await
    {
        return Err(CacheError::Unavailable(format!(
            "Key '{}' could not be stored",
            req.key
        )));
    }

    Ok(Json(MessageResponse::stored(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    check(validate_key(&key))?;

    match state.cache.get::<Value>(&key).await {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>> {
    check(validate_key(&key))?;

    if !state.cache.delete(&key).await {
        return Err(CacheError::Unavailable(format!(
            "Key '{}' could not be deleted",
            key
        )));
    }

    Ok(Json(MessageResponse::deleted(key)))
}

/// Handler for GET /exists/:key
pub async fn exists_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ExistsResponse>> {
    check(validate_key(&key))?;

    let exists = state.cache.exists(&key).await;
    Ok(Json(ExistsResponse { key, exists }))
}

/// Handler for POST /batch/get
pub async fn batch_get_handler(
    State(state): State<AppState>,
    Json(req): Json<KeysRequest>,
) -> Result<Json<BatchGetResponse>> {
    check(req.validate())?;

    let values = state.cache.batch_get::<Value>(&req.keys).await;
    Ok(Json(BatchGetResponse { values }))
}

/// Handler for POST /batch/set
pub async fn batch_set_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchSetRequest>,
) -> Result<Json<BatchSetResponse>> {
    check(req.validate())?;

    let stored = req.entries.len();
    let entries = req.entries.into_iter().map(|e| (e.key, e.value));
    if !state.cache.batch_set(entries, req.ttl).await {
        return Err(CacheError::Unavailable(format!(
            "Batch of {stored} entries could not be stored"
        )));
    }

    Ok(Json(BatchSetResponse { stored }))
}

/// Handler for POST /batch/delete
pub async fn batch_delete_handler(
    State(state): State<AppState>,
    Json(req): Json<KeysRequest>,
) -> Result<Json<RemovedResponse>> {
    check(req.validate())?;

    let removed = state.cache.batch_delete(&req.keys).await;
    Ok(Json(RemovedResponse { removed }))
}

/// Handler for POST /invalidate/tag/:tag
pub async fn invalidate_tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<RemovedResponse>> {
    check(validate_key(&tag))?;

    let removed = state.cache.invalidate_by_tag(&tag).await;
    Ok(Json(RemovedResponse { removed }))
}

/// Handler for POST /invalidate/pattern
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<PatternRequest>,
) -> Result<Json<RemovedResponse>> {
    check(req.validate())?;

    let removed = state.cache.invalidate_by_pattern(&req.pattern).await;
    Ok(Json(RemovedResponse { removed }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let size = state.cache.cache_size().await;
    Json(StatsResponse::new(state.cache.metrics(), size))
}

/// Handler for GET /health
///
/// Always answers 200; a down L2 is reported as "degraded" because the
/// service keeps serving from L1.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(state.cache.ping().await))
}
