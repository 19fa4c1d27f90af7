//! tiercache - a two-tier cache
//!
//! An in-process L1 of decoded values over a shared networked L2 (Redis),
//! governed by per-key policies for TTL, serialization, compression and
//! invalidation tags. Ships with an HTTP gateway and a cache-aside wrapper.

pub mod api;
pub mod cache;
pub mod codec;
pub mod config;
pub mod decorator;
pub mod error;
pub mod glob;
pub mod l2;
pub mod models;
pub mod policy;
pub mod service;
pub mod tags;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use decorator::CachedFn;
pub use error::CacheError;
pub use policy::{CachePolicy, PolicyRegistry, SerializationFormat};
pub use service::{CacheService, CacheSize, CacheValue};
pub use tasks::spawn_cleanup_task;
