//! Prometheus metrics for cache warm cycles

use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics for warm cycles, registered in their own [`Registry`]
#[derive(Clone)]
pub struct WarmMetrics {
    registry: Registry,

    /// Warm cycles by result (completed, catalog_failed)
    pub warm_cycles_total: Arc<CounterVec>,

    /// Keys processed during warming by result (stored, failed); stored keys
    /// missing a section are also counted under `degraded`
    pub warm_keys_total: Arc<CounterVec>,

    /// Duration of complete warm cycles
    pub warm_duration_seconds: Arc<Histogram>,
}

impl WarmMetrics {
    /// Create warm metrics in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create warm metrics registered in `registry`
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let warm_cycles_total = CounterVec::new(
            Opts::new(
                "county_stats_warm_cycles_total",
                "Total number of cache warm cycles",
            ),
            &["result"],
        )?;
        registry.register(Box::new(warm_cycles_total.clone()))?;

        let warm_keys_total = CounterVec::new(
            Opts::new(
                "county_stats_warm_keys_total",
                "Total number of regions processed while warming",
            ),
            &["result"],
        )?;
        registry.register(Box::new(warm_keys_total.clone()))?;

        let warm_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "county_stats_warm_duration_seconds",
                "Duration of cache warm cycles in seconds",
            )
            .buckets(vec![
                0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
            ]),
        )?;
        registry.register(Box::new(warm_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            warm_cycles_total: Arc::new(warm_cycles_total),
            warm_keys_total: Arc::new(warm_keys_total),
            warm_duration_seconds: Arc::new(warm_duration_seconds),
        })
    }

    /// Record the end of a cycle
    pub fn record_cycle(&self, completed: bool, duration_secs: f64) {
        let result = if completed { "completed" } else { "catalog_failed" };
        self.warm_cycles_total.with_label_values(&[result]).inc();
        if completed {
            self.warm_duration_seconds.observe(duration_secs);
        }
    }

    /// Record one processed key
    ///
    /// `degraded` is a subset of `stored`, as in [`crate::models::WarmReport`].
    pub fn record_key(&self, stored: bool, degraded: bool) {
        if !stored {
            self.warm_keys_total.with_label_values(&["failed"]).inc();
            return;
        }
        self.warm_keys_total.with_label_values(&["stored"]).inc();
        if degraded {
            self.warm_keys_total.with_label_values(&["degraded"]).inc();
        }
    }

    /// Render the registry in Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
