//! Cache-aside resolution of single regions
//!
//! `resolve(key)`:
//! 1. Look the key up in the cache. A hit is returned unmodified, even when
//!    the stored record is degraded.
//! 2. On a miss, fetch the record, back-fill the cache and return the record.
//!    Degraded records are stored as well; there is no retry-on-partial.
//!
//! Cache failures never fail a resolve: a failed read is treated as a miss
//! and a failed write is logged and dropped. A total fetch failure is returned
//! to the caller and nothing is written for the key.

use crate::cache::RegionCache;
use crate::error::Result;
use crate::fetcher::StatsFetcher;
use crate::metrics::StatsMetrics;
use crate::models::{RegionKey, RegionRecord};
use std::sync::Arc;
use tracing::{info, warn};

/// Resolves region records through the shared cache
#[derive(Clone)]
pub struct CacheAsideResolver {
    cache: RegionCache,
    fetcher: Arc<StatsFetcher>,
    metrics: Arc<StatsMetrics>,
}

impl CacheAsideResolver {
    pub fn new(
        cache: RegionCache,
        fetcher: Arc<StatsFetcher>,
        metrics: Arc<StatsMetrics>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            metrics,
        }
    }

    /// Return the record for `key`, from cache when present
    ///
    /// Emits exactly one hit or miss observation and writes the cache at most
    /// once, only on a miss.
    pub async fn resolve(&self, key: &RegionKey) -> Result<RegionRecord> {
        let cache_key = self.cache.cache_key(key);

        let cached = match self.cache.get(key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(
                    "Cache read failed for {}, falling through to fetch: {}",
                    cache_key, e
                );
                self.metrics.record_cache_error();
                None
            }
        };

        if let Some(record) = cached {
            info!("CACHE HIT: {}", cache_key);
            self.metrics.record_cache_hit();
            return Ok(record);
        }

        info!("CACHE MISS: {}", cache_key);
        self.metrics.record_cache_miss();

        let record = self.fetcher.fetch(key).await?;

        match self.cache.set(key, &record).await {
            Ok(()) => {
                info!("CACHE FILL: {}", cache_key);
                self.metrics.record_cache_fill();
            }
            Err(e) => {
                warn!("Cache write failed for {}: {}", cache_key, e);
                self.metrics.record_cache_error();
            }
        }

        Ok(record)
    }
}
