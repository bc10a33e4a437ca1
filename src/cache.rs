//! Cache storage for region records
//!
//! Two layers:
//! - [`CacheBackend`]: a plain string key/value store (Redis in production,
//!   [`MemoryCache`] for tests and single-process use)
//! - [`RegionCache`]: namespaces keys as `<prefix>:<region>` and encodes
//!   records as JSON text
//!
//! There is no TTL and no eviction. Writes are unconditional overwrites, so
//! concurrent writers for the same key resolve as last-write-wins.

use crate::error::{Result, StatsError};
use crate::models::{RegionKey, RegionRecord};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// String key/value store backing the record cache
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// `Ok(None)` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditional overwrite
    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

/// In-process cache backend
#[derive(Default)]
pub struct MemoryCache {
    storage: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let storage = self
            .storage
            .read()
            .map_err(|e| StatsError::CacheUnavailable(format!("lock poisoned: {}", e)))?;
        Ok(storage.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut storage = self
            .storage
            .write()
            .map_err(|e| StatsError::CacheUnavailable(format!("lock poisoned: {}", e)))?;
        storage.insert(key.to_string(), value);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let storage = self
            .storage
            .read()
            .map_err(|e| StatsError::CacheUnavailable(format!("lock poisoned: {}", e)))?;
        Ok(storage.contains_key(key))
    }
}

/// Redis cache backend
///
/// The connection is opened on first use, so the service starts while Redis
/// is down and serves every request from the store until it comes up. The
/// connection manager reconnects on its own afterwards. While Redis is
/// unreachable every operation fails with [`StatsError::CacheUnavailable`].
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    conn: Arc<OnceCell<ConnectionManager>>,
}

impl RedisCache {
    /// Create a backend for the Redis server at `url` without connecting
    ///
    /// Fails only when `url` is not a valid Redis URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            conn: Arc::new(OnceCell::new()),
        })
    }

    /// Whether a connection has been established
    pub fn is_connected(&self) -> bool {
        self.conn.initialized()
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new(self.client.clone()).await?;
                info!("Redis connected");
                Ok::<_, StatsError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }
}

/// Record-level view of a [`CacheBackend`]
#[derive(Clone)]
pub struct RegionCache {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
}

impl RegionCache {
    /// Create a record cache storing under `<prefix>:<region>`
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    /// Generate the cache key for a region
    ///
    /// Format: {prefix}:{region}
    pub fn cache_key(&self, key: &RegionKey) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Look up a cached record
    ///
    /// # Returns
    /// * `Ok(Some(record))` on hit, including previously stored degraded records
    /// * `Ok(None)` when nothing is stored under the key
    /// * `Err(StatsError)` when the backend fails or the value cannot be decoded
    pub async fn get(&self, key: &RegionKey) -> Result<Option<RegionRecord>> {
        let cache_key = self.cache_key(key);
        match self.backend.get(&cache_key).await? {
            Some(value) => {
                debug!("Cache lookup found {} ({} bytes)", cache_key, value.len());
                RegionRecord::from_json(&value).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Store a record, overwriting any previous value
    pub async fn set(&self, key: &RegionKey, record: &RegionRecord) -> Result<()> {
        let cache_key = self.cache_key(key);
        let value = record.to_json()?;
        debug!("Storing {} ({} bytes)", cache_key, value.len());
        self.backend.set(&cache_key, value).await
    }

    pub async fn exists(&self, key: &RegionKey) -> Result<bool> {
        self.backend.exists(&self.cache_key(key)).await
    }
}
