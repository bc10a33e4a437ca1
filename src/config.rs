//! Configuration management for the county statistics service

use crate::error::{Result, StatsError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

/// Environment variable overriding [`StatsConfig::database_url`]
pub const ENV_DB_SERVER: &str = "DB_SERVER";

/// Environment variable overriding [`StatsConfig::redis_url`]
pub const ENV_REDIS_HOST: &str = "REDIS_HOST";

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Configuration for the county statistics service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// PostgreSQL/PostGIS connection string for the backing store
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum number of pooled database connections (default: 16)
    #[serde(default = "default_db_pool_size")]
    pub db_pool_size: usize,

    /// Redis connection URL for the shared cache
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Namespace prefix for cache keys; keys are `<prefix>:<region>` (default: "county")
    #[serde(default = "default_cache_key_prefix")]
    pub cache_key_prefix: String,

    /// Maximum number of regions fetched concurrently while warming (default: 8)
    #[serde(default = "default_max_concurrent_warm")]
    pub max_concurrent_warm: usize,

    /// Address the statistics endpoint listens on
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Request path of the statistics endpoint (default: "/countyData")
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,

    /// Log level for the tracing subscriber (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

// Default value functions for serde
fn default_database_url() -> String {
    "postgres://postgres@localhost/nypad".to_string()
}

fn default_db_pool_size() -> usize {
    16
}

fn default_redis_url() -> String {
    "redis://127.0.0.1/".to_string()
}

fn default_cache_key_prefix() -> String {
    "county".to_string()
}

fn default_max_concurrent_warm() -> usize {
    8
}

fn default_listen_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_endpoint_path() -> String {
    "/countyData".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            database_url: default_database_url(),
            db_pool_size: default_db_pool_size(),
            redis_url: default_redis_url(),
            cache_key_prefix: default_cache_key_prefix(),
            max_concurrent_warm: default_max_concurrent_warm(),
            listen_address: default_listen_address(),
            endpoint_path: default_endpoint_path(),
            log_level: default_log_level(),
            metrics_endpoint: None,
        }
    }
}

impl StatsConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(StatsConfig)` if loading and validation succeed
    /// * `Err(StatsError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| StatsError::ConfigError(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: StatsConfig = serde_yaml::from_str(content)
            .map_err(|e| StatsError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `DB_SERVER` / `REDIS_HOST` from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_DB_SERVER).ok(),
            std::env::var(ENV_REDIS_HOST).ok(),
        );
    }

    /// Apply explicit overrides for the database and redis locations
    ///
    /// Empty values are ignored. A redis value without a scheme is treated as
    /// a bare host name.
    pub fn apply_overrides(&mut self, db_server: Option<String>, redis_host: Option<String>) {
        if let Some(db) = db_server.filter(|v| !v.trim().is_empty()) {
            self.database_url = db;
        }

        if let Some(host) = redis_host.filter(|v| !v.trim().is_empty()) {
            self.redis_url = if host.contains("://") {
                host
            } else {
                format!("redis://{}/", host)
            };
        }
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - db_pool_size and max_concurrent_warm must be > 0
    /// - cache_key_prefix must be non-empty and contain no whitespace
    /// - listen_address (and metrics address, if enabled) must be socket addresses
    /// - endpoint_path must start with '/'
    /// - log_level must be a known tracing level
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(StatsError::ConfigError(
                "database_url must not be empty".to_string(),
            ));
        }

        if self.db_pool_size == 0 {
            return Err(StatsError::ConfigError(
                "db_pool_size must be greater than 0".to_string(),
            ));
        }

        if self.redis_url.trim().is_empty() {
            return Err(StatsError::ConfigError(
                "redis_url must not be empty".to_string(),
            ));
        }

        if self.cache_key_prefix.is_empty()
            || self.cache_key_prefix.chars().any(char::is_whitespace)
        {
            return Err(StatsError::ConfigError(format!(
                "cache_key_prefix must be non-empty and contain no whitespace, got '{}'",
                self.cache_key_prefix
            )));
        }

        if self.max_concurrent_warm == 0 {
            return Err(StatsError::ConfigError(
                "max_concurrent_warm must be greater than 0".to_string(),
            ));
        }

        self.listen_addr()?;

        if !self.endpoint_path.starts_with('/') {
            return Err(StatsError::ConfigError(format!(
                "endpoint_path must start with '/', got '{}'",
                self.endpoint_path
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(StatsError::ConfigError(format!(
                "Invalid log_level '{}', must be one of {:?}",
                self.log_level, VALID_LOG_LEVELS
            )));
        }

        if let Some(metrics) = &self.metrics_endpoint {
            if metrics.enabled {
                metrics.address.parse::<SocketAddr>().map_err(|e| {
                    StatsError::ConfigError(format!(
                        "Invalid metrics_endpoint address '{}': {}",
                        metrics.address, e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Parsed listen address of the statistics endpoint
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen_address.parse().map_err(|e| {
            StatsError::ConfigError(format!(
                "Invalid listen_address '{}': {}",
                self.listen_address, e
            ))
        })
    }

    /// Parsed metrics endpoint address, if the endpoint is enabled
    pub fn metrics_addr(&self) -> Result<Option<SocketAddr>> {
        match &self.metrics_endpoint {
            Some(metrics) if metrics.enabled => {
                let addr = metrics.address.parse().map_err(|e| {
                    StatsError::ConfigError(format!(
                        "Invalid metrics_endpoint address '{}': {}",
                        metrics.address, e
                    ))
                })?;
                Ok(Some(addr))
            }
            _ => Ok(None),
        }
    }

    /// Parsed log level for the tracing subscriber
    pub fn tracing_level(&self) -> tracing::Level {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}
