// Shared in-memory fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use county_stats::{
    BulkWarmer, CacheAsideResolver, CacheBackend, MemoryCache, RegionCache, RegionCatalog,
    RegionKey, Result, SectionSource, StatsError, StatsFetcher, StatsMetrics,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Section source answering from a per-key script
///
/// Keys without a script entry fail with a database error.
pub struct ScriptedSection {
    name: &'static str,
    script: Mutex<HashMap<String, std::result::Result<Value, String>>>,
    delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedSection {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            script: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn succeed(self, key: &str, value: Value) -> Self {
        self.script.lock().unwrap().insert(key.to_string(), Ok(value));
        self
    }

    pub fn fail(self, key: &str, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(key.to_string(), Err(message.to_string()));
        self
    }

    pub fn set(&self, key: &str, value: Value) {
        self.script.lock().unwrap().insert(key.to_string(), Ok(value));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SectionSource for ScriptedSection {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, key: &RegionKey) -> Result<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.script.lock().unwrap().get(key.as_str()).cloned();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match scripted {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(message)) => Err(StatsError::DatabaseError(message)),
            None => Err(StatsError::DatabaseError(format!("no script for {}", key))),
        }
    }
}

/// Catalog returning the current key list, or failing
pub struct FakeCatalog {
    keys: Mutex<Option<Vec<String>>>,
    pub reads: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_keys(keys: &[&str]) -> Self {
        Self {
            keys: Mutex::new(Some(keys.iter().map(|k| k.to_string()).collect())),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            keys: Mutex::new(None),
            reads: AtomicUsize::new(0),
        }
    }

    /// Replace the key list returned by later reads
    pub fn set_keys(&self, keys: &[&str]) {
        *self.keys.lock().unwrap() = Some(keys.iter().map(|k| k.to_string()).collect());
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegionCatalog for FakeCatalog {
    async fn list_regions(&self) -> Result<Vec<RegionKey>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let keys = self.keys.lock().unwrap().clone();
        match keys {
            Some(keys) => Ok(keys.into_iter().map(RegionKey::new).collect()),
            None => Err(StatsError::DatabaseError(
                "relation \"counties_shoreline\" does not exist".to_string(),
            )),
        }
    }
}

/// Memory cache that can be switched to fail reads and/or writes
#[derive(Default)]
pub struct FlakyCache {
    inner: MemoryCache,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_set_keys: Mutex<Vec<String>>,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self) {
        self.fail_get.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_set.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes_for(&self, cache_key: &str) {
        self.fail_set_keys
            .lock()
            .unwrap()
            .push(cache_key.to_string());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub async fn raw(&self, cache_key: &str) -> Option<String> {
        self.inner.get(cache_key).await.unwrap()
    }
}

#[async_trait]
impl CacheBackend for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StatsError::CacheUnavailable("connection refused".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        let fail_key = self.fail_set_keys.lock().unwrap().iter().any(|k| k == key);
        if self.fail_set.load(Ordering::SeqCst) || fail_key {
            return Err(StatsError::CacheUnavailable("connection refused".to_string()));
        }
        self.inner.set(key, value).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StatsError::CacheUnavailable("connection refused".to_string()));
        }
        self.inner.exists(key).await
    }
}

/// Fully wired resolver and warmer over fakes
pub struct Harness {
    pub total: Arc<ScriptedSection>,
    pub gap_status: Arc<ScriptedSection>,
    pub catalog: Arc<FakeCatalog>,
    pub backend: Arc<FlakyCache>,
    pub cache: RegionCache,
    pub metrics: Arc<StatsMetrics>,
    pub fetcher: Arc<StatsFetcher>,
    pub resolver: Arc<CacheAsideResolver>,
    pub warmer: Arc<BulkWarmer>,
}

impl Harness {
    pub fn new(
        total: ScriptedSection,
        gap_status: ScriptedSection,
        catalog: FakeCatalog,
    ) -> Self {
        Self::with_concurrency(total, gap_status, catalog, 4)
    }

    pub fn with_concurrency(
        total: ScriptedSection,
        gap_status: ScriptedSection,
        catalog: FakeCatalog,
        max_concurrent: usize,
    ) -> Self {
        let total = Arc::new(total);
        let gap_status = Arc::new(gap_status);
        let catalog = Arc::new(catalog);
        let metrics = Arc::new(StatsMetrics::new());
        let backend = Arc::new(FlakyCache::new());
        let cache = RegionCache::new(backend.clone(), "county");
        let fetcher = Arc::new(StatsFetcher::new(
            vec![
                total.clone() as Arc<dyn SectionSource>,
                gap_status.clone() as Arc<dyn SectionSource>,
            ],
            metrics.clone(),
        ));
        let resolver = Arc::new(CacheAsideResolver::new(
            cache.clone(),
            fetcher.clone(),
            metrics.clone(),
        ));
        let warmer = Arc::new(BulkWarmer::new(
            catalog.clone(),
            fetcher.clone(),
            cache.clone(),
            metrics.clone(),
            max_concurrent,
        ));

        Self {
            total,
            gap_status,
            catalog,
            backend,
            cache,
            metrics,
            fetcher,
            resolver,
            warmer,
        }
    }

    /// Total sub-fetch calls across both sections
    pub fn sub_fetches(&self) -> usize {
        self.total.calls() + self.gap_status.calls()
    }
}
