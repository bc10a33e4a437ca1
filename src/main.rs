//! County Statistics Server
//!
//! Loads configuration, sets up logging, connects to PostGIS and Redis, and
//! serves the statistics endpoint (plus the optional metrics endpoint).

use anyhow::Context;
use county_stats::{
    BulkWarmer, CacheAsideResolver, MetricsEndpoint, PgRegionStore, RedisCache, RegionCache,
    StatsConfig, StatsFetcher, StatsMetrics, StatsService, WarmMetrics,
};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// # Usage
/// ```bash
/// # Start with default config (county_stats.yaml)
/// county-stats
///
/// # Start with custom config
/// county-stats /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "county_stats.yaml".to_string());

    let mut config = if Path::new(&config_path).exists() {
        StatsConfig::from_file(&config_path)
            .with_context(|| format!("loading configuration from {}", config_path))?
    } else {
        StatsConfig::default()
    };
    config.apply_env_overrides();
    config.validate().context("validating configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting county statistics server");
    if !Path::new(&config_path).exists() {
        warn!("Config file {} not found, using defaults", config_path);
    }
    info!("  - Cache key prefix: {}", config.cache_key_prefix);
    info!(
        "  - Max concurrent warm fetches: {}",
        config.max_concurrent_warm
    );
    info!("  - DB pool size: {}", config.db_pool_size);
    info!(
        "  - Endpoint: {}{}",
        config.listen_address, config.endpoint_path
    );

    let metrics = Arc::new(StatsMetrics::new());
    let warm_metrics = Arc::new(WarmMetrics::new().context("creating warm metrics")?);

    let store = PgRegionStore::connect(&config.database_url, config.db_pool_size)
        .context("creating database pool")?;
    let redis = RedisCache::new(&config.redis_url)
        .context("configuring redis")?;
    let cache = RegionCache::new(Arc::new(redis), config.cache_key_prefix.clone());

    let fetcher = Arc::new(StatsFetcher::new(store.sections(), metrics.clone()));
    let resolver = Arc::new(CacheAsideResolver::new(
        cache.clone(),
        fetcher.clone(),
        metrics.clone(),
    ));
    let warmer = Arc::new(
        BulkWarmer::new(
            Arc::new(store),
            fetcher,
            cache,
            metrics.clone(),
            config.max_concurrent_warm,
        )
        .with_metrics(warm_metrics.clone()),
    );

    if let Some(addr) = config.metrics_addr()? {
        let endpoint = MetricsEndpoint::new(metrics.clone(), addr)
            .with_warm_metrics(warm_metrics);
        tokio::spawn(async move {
            if let Err(e) = endpoint.start().await {
                error!("Metrics endpoint stopped: {}", e);
            }
        });
    }

    let service = Arc::new(StatsService::new(
        resolver,
        warmer,
        metrics,
        config.endpoint_path.clone(),
    ));
    service
        .serve(config.listen_addr()?)
        .await
        .context("serving statistics endpoint")?;

    Ok(())
}
