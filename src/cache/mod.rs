//! Cache Module
//!
//! The in-process tier: entries, LRU tracking, the bounded L1 store and the
//! metrics collector shared by the whole service.

mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, NativeValue};
pub use lru::LruTracker;
pub use stats::{CacheMetrics, MetricsCollector};
pub use store::{InsertOutcome, L1Store};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
