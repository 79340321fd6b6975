//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (MATHSVG_*, nested with `__`)
//! 2. TOML config file (if MATHSVG_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MATHSVG_*), e.g. `MATHSVG_CACHE__REDIS_ENABLED=true`
/// 2. TOML config file (if MATHSVG_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Request handling limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Budget for a single render request, including remote cache reads.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Longest graceful shutdown may take.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Largest accepted formula after trimming, in bytes.
    #[serde(default = "default_max_formula_bytes")]
    pub max_formula_bytes: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Cache tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Age after which a local entry expires.
    #[serde(default = "default_local_life_window_secs")]
    pub local_life_window_secs: u64,

    /// Interval between local expiry sweeps.
    #[serde(default = "default_local_clean_window_secs")]
    pub local_clean_window_secs: u64,

    /// Local tier byte budget in MiB.
    #[serde(default = "default_local_hard_max_cache_mb")]
    pub local_hard_max_cache_mb: usize,

    /// Local shard count, must be a power of two.
    #[serde(default = "default_local_shards")]
    pub local_shards: usize,

    /// Largest local entry (key + value bytes).
    #[serde(default = "default_local_max_entry_bytes")]
    pub local_max_entry_bytes: usize,

    #[serde(default)]
    pub redis_enabled: bool,

    /// `host:port` of the Redis server.
    #[serde(default = "default_redis_address")]
    pub redis_address: String,

    #[serde(default)]
    pub redis_password: Option<String>,

    #[serde(default)]
    pub redis_db: i64,

    #[serde(default = "default_redis_dial_timeout_ms")]
    pub redis_dial_timeout_ms: u64,

    #[serde(default = "default_redis_read_timeout_ms")]
    pub redis_read_timeout_ms: u64,

    #[serde(default = "default_redis_write_timeout_ms")]
    pub redis_write_timeout_ms: u64,

    /// Remote entry TTL.
    #[serde(default = "default_redis_ttl_secs")]
    pub redis_ttl_secs: u64,

    #[serde(default = "default_redis_max_retries")]
    pub redis_max_retries: usize,

    #[serde(default = "default_redis_min_retry_backoff_ms")]
    pub redis_min_retry_backoff_ms: u64,

    #[serde(default = "default_redis_max_retry_backoff_ms")]
    pub redis_max_retry_backoff_ms: u64,

    /// Timeout of a background remote write, independent of the request.
    #[serde(default = "default_remote_write_timeout_ms")]
    pub remote_write_timeout_ms: u64,

    /// Remote writes queued beyond this are dropped.
    #[serde(default = "default_remote_write_queue")]
    pub remote_write_queue: usize,

    /// Remote writes in flight at once.
    #[serde(default = "default_remote_write_concurrency")]
    pub remote_write_concurrency: usize,
}

fn default_request_timeout_ms() -> u64 {
    3_000
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

fn default_max_formula_bytes() -> usize {
    5 * 1024
}

fn default_log_level() -> String {
    "info".into()
}

fn default_local_life_window_secs() -> u64 {
    600
}

fn default_local_clean_window_secs() -> u64 {
    60
}

fn default_local_hard_max_cache_mb() -> usize {
    256
}

fn default_local_shards() -> usize {
    1024
}

fn default_local_max_entry_bytes() -> usize {
    64 * 1024
}

fn default_redis_address() -> String {
    "localhost:6379".into()
}

fn default_redis_dial_timeout_ms() -> u64 {
    500
}

fn default_redis_read_timeout_ms() -> u64 {
    2_000
}

fn default_redis_write_timeout_ms() -> u64 {
    2_000
}

fn default_redis_ttl_secs() -> u64 {
    168 * 3600
}

fn default_redis_max_retries() -> usize {
    2
}

fn default_redis_min_retry_backoff_ms() -> u64 {
    100
}

fn default_redis_max_retry_backoff_ms() -> u64 {
    500
}

fn default_remote_write_timeout_ms() -> u64 {
    2_000
}

fn default_remote_write_queue() -> usize {
    1024
}

fn default_remote_write_concurrency() -> usize {
    32
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            max_formula_bytes: default_max_formula_bytes(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_life_window_secs: default_local_life_window_secs(),
            local_clean_window_secs: default_local_clean_window_secs(),
            local_hard_max_cache_mb: default_local_hard_max_cache_mb(),
            local_shards: default_local_shards(),
            local_max_entry_bytes: default_local_max_entry_bytes(),
            redis_enabled: false,
            redis_address: default_redis_address(),
            redis_password: None,
            redis_db: 0,
            redis_dial_timeout_ms: default_redis_dial_timeout_ms(),
            redis_read_timeout_ms: default_redis_read_timeout_ms(),
            redis_write_timeout_ms: default_redis_write_timeout_ms(),
            redis_ttl_secs: default_redis_ttl_secs(),
            redis_max_retries: default_redis_max_retries(),
            redis_min_retry_backoff_ms: default_redis_min_retry_backoff_ms(),
            redis_max_retry_backoff_ms: default_redis_max_retry_backoff_ms(),
            remote_write_timeout_ms: default_remote_write_timeout_ms(),
            remote_write_queue: default_remote_write_queue(),
            remote_write_concurrency: default_remote_write_concurrency(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl CacheConfig {
    pub fn local_life_window(&self) -> Duration {
        Duration::from_secs(self.local_life_window_secs)
    }

    pub fn local_clean_window(&self) -> Duration {
        Duration::from_secs(self.local_clean_window_secs)
    }

    pub fn local_hard_max_bytes(&self) -> usize {
        self.local_hard_max_cache_mb * 1024 * 1024
    }

    pub fn redis_dial_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_dial_timeout_ms)
    }

    pub fn redis_read_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_read_timeout_ms)
    }

    pub fn redis_write_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_write_timeout_ms)
    }

    pub fn redis_max_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.redis_max_retry_backoff_ms)
    }

    pub fn redis_ttl(&self) -> Duration {
        Duration::from_secs(self.redis_ttl_secs)
    }

    pub fn remote_write_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_write_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `MATHSVG_`
    /// 2. TOML file from `MATHSVG_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("MATHSVG_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("MATHSVG_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.server.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.server.max_formula_bytes, 5120);
        assert_eq!(config.log.level, "info");

        let cache = &config.cache;
        assert_eq!(cache.local_life_window(), Duration::from_secs(600));
        assert_eq!(cache.local_clean_window(), Duration::from_secs(60));
        assert_eq!(cache.local_hard_max_bytes(), 256 * 1024 * 1024);
        assert!(!cache.redis_enabled);
        assert_eq!(cache.redis_address, "localhost:6379");
        assert!(cache.redis_password.is_none());
        assert_eq!(cache.redis_ttl(), Duration::from_secs(168 * 3600));
        assert_eq!(cache.redis_max_retries, 2);
        assert_eq!(cache.remote_write_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_nested_toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(
            r#"
            [cache]
            redis_enabled = true
            redis_address = "cache.internal:6380"
            redis_ttl_secs = 60

            [server]
            request_timeout_ms = 1500
            "#,
        ));
        let config: AppConfig = figment.extract().unwrap();

        assert!(config.cache.redis_enabled);
        assert_eq!(config.cache.redis_address, "cache.internal:6380");
        assert_eq!(config.cache.redis_ttl(), Duration::from_secs(60));
        assert_eq!(config.server.request_timeout_ms, 1500);
        assert_eq!(config.cache.local_shards, 1024);
        assert!(config.validate().is_ok());
    }
}
