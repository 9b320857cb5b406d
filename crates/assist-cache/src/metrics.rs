//! Cache metrics recording.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Describes the cache metrics.
/// Call once at startup, after installing a recorder.
pub fn register_cache_metrics() {
    metrics::describe_counter!("assist_cache_hits_total", "Total number of cache hits");
    metrics::describe_counter!("assist_cache_misses_total", "Total number of cache misses");
    metrics::describe_counter!(
        "assist_cache_stores_total",
        "Total number of entries written to the cache"
    );
    metrics::describe_counter!(
        "assist_cache_store_failures_total",
        "Total number of cache writes the storage rejected"
    );
    metrics::describe_counter!(
        "assist_queue_joins_total",
        "Total number of calls that joined an in-flight request"
    );
    metrics::describe_histogram!(
        "assist_storage_operation_seconds",
        "Time spent reading and writing storage slots"
    );
}

/// Cache metrics recorder.
/// Keeps local atomic counters next to the global facade so the hit rate
/// can be read back without a recorder.
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    stores: Arc<AtomicU64>,
    joins: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            stores: Arc::new(AtomicU64::new(0)),
            joins: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a cache hit
    pub fn record_hit(&self, source: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("assist_cache_hits_total", "source" => source.to_string()).increment(1);
    }

    /// Records a cache miss
    pub fn record_miss(&self, source: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("assist_cache_misses_total", "source" => source.to_string()).increment(1);
    }

    /// Records a cache write
    pub fn record_store(&self, source: &str) {
        self.stores.fetch_add(1, Ordering::Relaxed);
        counter!("assist_cache_stores_total", "source" => source.to_string()).increment(1);
    }

    /// Records a cache write the storage rejected
    pub fn record_store_failure(&self, source: &str) {
        counter!("assist_cache_store_failures_total", "source" => source.to_string())
            .increment(1);
    }

    /// Records a call that joined an in-flight request
    pub fn record_join(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
        counter!("assist_queue_joins_total").increment(1);
    }

    /// Records the duration of a storage operation
    pub fn record_operation_duration(&self, operation: &str, duration: Duration) {
        histogram!(
            "assist_storage_operation_seconds",
            "operation" => operation.to_string()
        )
        .record(duration.as_secs_f64());
    }

    /// Measures a storage operation
    pub fn time_operation<T, F: FnOnce() -> T>(&self, operation: &str, f: F) -> T {
        let start = Instant::now();
        let result = f();
        self.record_operation_duration(operation, start.elapsed());
        result
    }

    /// Hit rate, for logging/debugging
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 { 0.0 } else { hits / total }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn stores(&self) -> u64 {
        self.stores.load(Ordering::Relaxed)
    }

    pub fn joins(&self) -> u64 {
        self.joins.load(Ordering::Relaxed)
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}
