//! Bulk cache warming
//!
//! A warm cycle reads the full region catalog, then fetches and stores every
//! region in its own task. At most `max_concurrent` fetches run at a time.
//! Each key's pipeline is isolated: a failure is logged and counted for that
//! key only. Warm writes race freely with resolver writes for the same key;
//! the last write wins.

use crate::cache::RegionCache;
use crate::error::{Result, StatsError};
use crate::fetcher::StatsFetcher;
use crate::metrics::StatsMetrics;
use crate::models::{RegionKey, WarmReport};
use crate::source::RegionCatalog;
use crate::warm_metrics::WarmMetrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Populates the cache for every region of the catalog
#[derive(Clone)]
pub struct BulkWarmer {
    catalog: Arc<dyn RegionCatalog>,
    fetcher: Arc<StatsFetcher>,
    cache: RegionCache,
    metrics: Arc<StatsMetrics>,
    warm_metrics: Option<Arc<WarmMetrics>>,
    max_concurrent: usize,
}

impl BulkWarmer {
    /// Create a new BulkWarmer
    ///
    /// # Arguments
    /// * `max_concurrent` - Maximum number of regions fetched at once (at least 1)
    pub fn new(
        catalog: Arc<dyn RegionCatalog>,
        fetcher: Arc<StatsFetcher>,
        cache: RegionCache,
        metrics: Arc<StatsMetrics>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            cache,
            metrics,
            warm_metrics: None,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Enable Prometheus warm metrics
    pub fn with_metrics(mut self, warm_metrics: Arc<WarmMetrics>) -> Self {
        self.warm_metrics = Some(warm_metrics);
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Start a warm cycle in the background without waiting for it
    ///
    /// The cycle logs its own outcome. The handle may be awaited or dropped;
    /// dropping it does not cancel the cycle.
    pub fn spawn_warm_all(self: &Arc<Self>) -> JoinHandle<Result<WarmReport>> {
        let warmer = Arc::clone(self);
        tokio::spawn(async move { warmer.warm_all().await })
    }

    /// Run one full warm cycle
    ///
    /// # Returns
    /// * `Ok(WarmReport)` once a store was attempted for every catalog key
    /// * `Err(StatsError::CatalogReadFailed)` if the catalog could not be read;
    ///   no key is attempted in that case
    pub async fn warm_all(&self) -> Result<WarmReport> {
        let start = Instant::now();
        self.metrics.record_warm_started();
        info!("Starting cache warm cycle");

        let keys = match self.catalog.list_regions().await {
            Ok(keys) => keys,
            Err(e) => {
                let err = match e {
                    StatsError::CatalogReadFailed(_) => e,
                    other => StatsError::CatalogReadFailed(other.to_string()),
                };
                error!("Cache warm aborted: {}", err);
                self.metrics.record_warm_finished(false);
                if let Some(warm_metrics) = &self.warm_metrics {
                    let elapsed = start.elapsed().as_secs_f64();
                    warm_metrics.record_cycle(false, elapsed);
                }
                return Err(err);
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = Vec::with_capacity(keys.len());

        for key in &keys {
            let sem = Arc::clone(&semaphore);
            let key = key.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let cache = self.cache.clone();

            tasks.push(tokio::spawn(async move {
                // Bound concurrent fetches against the backing store
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| StatsError::warm_key(key.as_str(), e.to_string()))?;

                warm_key(&fetcher, &cache, &key).await
            }));
        }

        let mut report = WarmReport {
            total_keys: keys.len(),
            ..Default::default()
        };

        for (task, key) in tasks.into_iter().zip(&keys) {
            let outcome = task.await.unwrap_or_else(|e| {
                Err(StatsError::warm_key(
                    key.as_str(),
                    format!("task join error: {}", e),
                ))
            });

            match outcome {
                Ok(degraded) => {
                    report.stored += 1;
                    if degraded {
                        report.degraded += 1;
                    }
                    self.metrics.record_warm_key(true);
                    if let Some(warm_metrics) = &self.warm_metrics {
                        warm_metrics.record_key(true, degraded);
                    }
                }
                Err(e) => {
                    warn!("{}", e);
                    self.metrics.record_warm_key(false);
                    if let Some(warm_metrics) = &self.warm_metrics {
                        warm_metrics.record_key(false, false);
                    }
                    report.failures.push(e);
                }
            }
        }

        report.duration = start.elapsed();
        self.metrics.record_warm_finished(true);
        if let Some(warm_metrics) = &self.warm_metrics {
            let elapsed = report.duration.as_secs_f64();
            warm_metrics.record_cycle(true, elapsed);
        }

        info!(
            "Cache warm cycle finished: {} regions, {} stored ({} degraded), {} failed in {:?}",
            report.total_keys,
            report.stored,
            report.degraded,
            report.failures.len(),
            report.duration
        );

        Ok(report)
    }
}

/// Fetch and store one region; returns whether the stored record is degraded
async fn warm_key(fetcher: &StatsFetcher, cache: &RegionCache, key: &RegionKey) -> Result<bool> {
    let record = fetcher
        .fetch(key)
        .await
        .map_err(|e| StatsError::warm_key(key.as_str(), e.to_string()))?;
    let degraded = fetcher.is_degraded(&record);

    cache
        .set(key, &record)
        .await
        .map_err(|e| StatsError::warm_key(key.as_str(), e.to_string()))?;

    info!("CACHE WARM: {}", cache.cache_key(key));
    Ok(degraded)
}
