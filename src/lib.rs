//! County Statistics Service
//!
//! Per-region protected-area statistics (feature counts, acreage, GAP status
//! breakdowns) computed from a PostGIS store and served through a shared
//! read-through cache.
//!
//! # Overview
//!
//! The aggregation queries behind a region record are slow, so every record is
//! cached under `<prefix>:<region>`. Two paths write the cache:
//!
//! - **Cache-aside resolution**: a request for one region is answered from the
//!   cache when possible, otherwise the record is fetched, stored and returned.
//! - **Bulk warming**: a warm cycle enumerates every region and fetches and
//!   stores each one concurrently, bounded by a semaphore, in the background.
//!
//! Both paths share one cache with no locking; concurrent writes for the same
//! region resolve as last-write-wins.
//!
//! # Architecture
//!
//! - [`StatsFetcher`]: runs the section sub-fetches of a region concurrently and
//!   merges them; a failed section is left out instead of failing the record
//! - [`RegionCache`]: namespaced JSON records over a [`CacheBackend`]
//!   ([`RedisCache`] or [`MemoryCache`])
//! - [`CacheAsideResolver`]: hit/miss resolution with back-fill
//! - [`BulkWarmer`]: full-catalog warm cycles
//! - [`StatsService`]: decodes the endpoint's query string and dispatches
//! - [`PgRegionStore`]: the PostGIS section sources and region catalog
//!
//! # Degraded records
//!
//! A record missing a section because its sub-fetch failed is still returned
//! and cached. Callers that care check section membership:
//!
//! ```rust
//! use county_stats::{RegionRecord, SECTION_GAP_STATUS, SECTION_TOTAL};
//! use serde_json::json;
//!
//! let mut record = RegionRecord::new();
//! record.insert_section(SECTION_TOTAL, json!({"pa_count": 3}));
//!
//! assert!(!record.is_complete(&[SECTION_TOTAL, SECTION_GAP_STATUS]));
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use county_stats::{
//!     BulkWarmer, CacheAsideResolver, MemoryCache, PgRegionStore, RegionCache, RegionKey,
//!     StatsFetcher, StatsMetrics,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(StatsMetrics::new());
//! let store = PgRegionStore::connect("postgres://postgres@localhost/nypad", 16)?;
//! let fetcher = Arc::new(StatsFetcher::new(store.sections(), metrics.clone()));
//! let cache = RegionCache::new(Arc::new(MemoryCache::new()), "county");
//!
//! let resolver = CacheAsideResolver::new(cache.clone(), fetcher.clone(), metrics.clone());
//! let record = resolver.resolve(&RegionKey::new("AL")).await?;
//! println!("{}", serde_json::to_string(&record)?);
//!
//! let warmer = Arc::new(BulkWarmer::new(Arc::new(store), fetcher, cache, metrics, 8));
//! warmer.spawn_warm_all();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod metrics_endpoint;
pub mod models;
pub mod resolver;
pub mod service;
pub mod source;
pub mod warm_metrics;
pub mod warmer;

// Re-export commonly used types
pub use cache::{CacheBackend, MemoryCache, RedisCache, RegionCache};
pub use config::{MetricsEndpointConfig, StatsConfig};
pub use error::{Result, StatsError};
pub use fetcher::{SectionOutcome, StatsFetcher};
pub use metrics::{MetricsSnapshot, StatsMetrics};
pub use metrics_endpoint::MetricsEndpoint;
pub use models::{RegionKey, RegionRecord, WarmReport, SECTION_GAP_STATUS, SECTION_TOTAL};
pub use resolver::CacheAsideResolver;
pub use service::{StatsQuery, StatsService};
pub use source::{PgRegionStore, RegionCatalog, SectionSource};
pub use warm_metrics::WarmMetrics;
pub use warmer::BulkWarmer;
