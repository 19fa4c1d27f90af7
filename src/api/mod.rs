//! API Module
//!
//! HTTP gateway over the cache service.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value under a key
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key from both tiers
//! - `GET /exists/:key` - Check whether a key is cached
//! - `POST /batch/get`, `/batch/set`, `/batch/delete` - Batch operations
//! - `POST /invalidate/tag/:tag` - Drop every key registered under a tag
//! - `POST /invalidate/pattern` - Drop every key matching a glob
//! - `GET /stats` - Metrics, hit rate and tier sizes
//! - `GET /health` - Liveness plus L2 reachability

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
