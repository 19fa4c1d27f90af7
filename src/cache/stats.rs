//! Cache Statistics Module
//!
//! Process-wide counters for hits, misses, evictions and response time.
//! Counters are atomics so concurrent callers never lose an update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

// == Cache Metrics ==
/// Point-in-time snapshot of the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    /// Number of get requests answered from L1 or L2
    pub hits: u64,
    /// Number of get requests answered with nothing
    pub misses: u64,
    /// Number of entries evicted from L1 by the LRU policy
    pub evictions: u64,
    /// Number of get requests (hits + misses)
    pub total_requests: u64,
    /// Number of set requests
    pub sets: u64,
    /// Number of set requests that did not reach L2
    pub set_failures: u64,
    /// Number of L2 calls that failed or timed out
    pub backend_errors: u64,
    /// Mean latency of get/set calls in microseconds
    pub avg_response_time_us: f64,
}

impl CacheMetrics {
    // == Hit Rate ==
    /// Returns hits / total_requests, or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }
}

// == Metrics Collector ==
#[derive(Debug, Default)]
pub struct MetricsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    sets: AtomicU64,
    set_failures: AtomicU64,
    backend_errors: AtomicU64,
    timed_calls: AtomicU64,
    total_time_us: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_set(&self, ok: bool) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.set_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds one call's latency into the running average.
    pub fn record_latency(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_time_us.fetch_add(micros, Ordering::Relaxed);
        self.timed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    pub fn snapshot(&self) -> CacheMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let calls = self.timed_calls.load(Ordering::Relaxed);
        let total_us = self.total_time_us.load(Ordering::Relaxed);

        CacheMetrics {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            total_requests: hits + misses,
            sets: self.sets.load(Ordering::Relaxed),
            set_failures: self.set_failures.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            avg_response_time_us: if calls == 0 {
                0.0
            } else {
                total_us as f64 / calls as f64
            },
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_metrics_new() {
        let metrics = MetricsCollector::new().snapshot();
        assert_eq!(metrics, CacheMetrics::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let collector = MetricsCollector::new();
        collector.record_hit();
        collector.record_hit();
        collector.record_hit();
        collector.record_miss();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.hit_rate(), 0.75);
    }

    #[test]
    fn test_record_evictions_and_sets() {
        let collector = MetricsCollector::new();
        collector.record_evictions(0);
        collector.record_evictions(3);
        collector.record_set(true);
        collector.record_set(false);
        collector.record_backend_error();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.evictions, 3);
        assert_eq!(snapshot.sets, 2);
        assert_eq!(snapshot.set_failures, 1);
        assert_eq!(snapshot.backend_errors, 1);
    }

    #[test]
    fn test_average_latency() {
        let collector = MetricsCollector::new();
        collector.record_latency(Duration::from_micros(100));
        collector.record_latency(Duration::from_micros(300));
        assert_eq!(collector.snapshot().avg_response_time_us, 200.0);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let collector = Arc::new(MetricsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&collector);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.record_hit();
                        c.record_miss();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.hits, 8000);
        assert_eq!(snapshot.misses, 8000);
        assert_eq!(snapshot.total_requests, 16000);
    }
}
