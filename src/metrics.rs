//! Metrics collection for the county statistics service
//!
//! Thread-safe counters using atomic operations. Tracks requests, cache
//! hits/misses, fetches, sub-fetch failures and warm cycles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector shared by the resolver, the warmer and the fetcher
///
/// All operations are thread-safe using atomic operations.
#[derive(Debug, Default)]
pub struct StatsMetrics {
    // Request statistics
    total_requests: AtomicU64,
    warm_requests: AtomicU64,
    failed_requests: AtomicU64,

    // Cache statistics
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,
    cache_fills: AtomicU64,

    // Fetch statistics
    total_fetches: AtomicU64,
    failed_fetches: AtomicU64,
    sub_fetch_failures: AtomicU64,
    degraded_records: AtomicU64,

    // Warm statistics
    warm_cycles_started: AtomicU64,
    warm_cycles_completed: AtomicU64,
    warm_cycles_failed: AtomicU64,
    warm_keys_stored: AtomicU64,
    warm_keys_failed: AtomicU64,

    // Latency statistics (stored as microseconds)
    total_fetch_duration_us: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub warm_requests: u64,
    pub failed_requests: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,
    pub cache_fills: u64,

    pub total_fetches: u64,
    pub failed_fetches: u64,
    pub sub_fetch_failures: u64,
    pub degraded_records: u64,

    pub warm_cycles_started: u64,
    pub warm_cycles_completed: u64,
    pub warm_cycles_failed: u64,
    pub warm_keys_stored: u64,
    pub warm_keys_failed: u64,

    pub total_fetch_duration_us: u64,
}

impl StatsMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an inbound request; `warm` is set when it carried the warm command
    pub fn record_request(&self, warm: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if warm {
            self.warm_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a request answered with an error response
    pub fn record_failed_request(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed cache read or write (backend unreachable or undecodable value)
    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful back-fill of a missed key
    pub fn record_cache_fill(&self) {
        self.cache_fills.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed fetch and its duration
    ///
    /// # Arguments
    /// * `success` - Whether at least one section was obtained
    /// * `duration` - Time spent across all concurrent sub-fetches
    pub fn record_fetch(&self, success: bool, duration: Duration) {
        self.total_fetches.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_fetches.fetch_add(1, Ordering::Relaxed);
        }
        self.total_fetch_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_sub_fetch_failure(&self) {
        self.sub_fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fetched record that is missing at least one expected section
    pub fn record_degraded_record(&self) {
        self.degraded_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warm_started(&self) {
        self.warm_cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the end of a warm cycle; `success` is false when the catalog could not be read
    pub fn record_warm_finished(&self, success: bool) {
        if success {
            self.warm_cycles_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.warm_cycles_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_warm_key(&self, stored: bool) {
        if stored {
            self.warm_keys_stored.fetch_add(1, Ordering::Relaxed);
        } else {
            self.warm_keys_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get a snapshot of current metrics
    ///
    /// Fields are loaded independently, so a snapshot taken while work is in
    /// flight may not be perfectly consistent across fields.
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            warm_requests: self.warm_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            cache_fills: self.cache_fills.load(Ordering::Relaxed),
            total_fetches: self.total_fetches.load(Ordering::Relaxed),
            failed_fetches: self.failed_fetches.load(Ordering::Relaxed),
            sub_fetch_failures: self.sub_fetch_failures.load(Ordering::Relaxed),
            degraded_records: self.degraded_records.load(Ordering::Relaxed),
            warm_cycles_started: self.warm_cycles_started.load(Ordering::Relaxed),
            warm_cycles_completed: self.warm_cycles_completed.load(Ordering::Relaxed),
            warm_cycles_failed: self.warm_cycles_failed.load(Ordering::Relaxed),
            warm_keys_stored: self.warm_keys_stored.load(Ordering::Relaxed),
            warm_keys_failed: self.warm_keys_failed.load(Ordering::Relaxed),
            total_fetch_duration_us: self.total_fetch_duration_us.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.warm_requests,
            &self.failed_requests,
            &self.cache_hits,
            &self.cache_misses,
            &self.cache_errors,
            &self.cache_fills,
            &self.total_fetches,
            &self.failed_fetches,
            &self.sub_fetch_failures,
            &self.degraded_records,
            &self.warm_cycles_started,
            &self.warm_cycles_completed,
            &self.warm_cycles_failed,
            &self.warm_keys_stored,
            &self.warm_keys_failed,
            &self.total_fetch_duration_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl MetricsSnapshot {
    /// Calculate cache hit rate as a percentage (0.0 to 100.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate average fetch duration in milliseconds
    pub fn avg_fetch_duration_ms(&self) -> f64 {
        if self.total_fetches == 0 {
            0.0
        } else {
            (self.total_fetch_duration_us as f64 / self.total_fetches as f64) / 1000.0
        }
    }
}
