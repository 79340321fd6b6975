//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `server.request_timeout_ms` is below 10ms or above 5 minutes
    /// - `server.max_formula_bytes` is 0
    /// - `cache.local_shards` is not a power of two
    /// - a local window or the local byte budget is 0
    /// - `cache.local_max_entry_bytes` does not fit in one shard
    /// - redis is enabled with an empty address
    /// - the retry backoff bounds are inverted
    /// - `cache.redis_ttl_secs` or a remote write setting is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.request_timeout_ms < 10 {
            return Err(invalid("server.request_timeout_ms", "must be at least 10ms"));
        }
        if server.request_timeout_ms > 300_000 {
            return Err(invalid("server.request_timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }
        if server.max_formula_bytes == 0 {
            return Err(invalid("server.max_formula_bytes", "must be greater than 0"));
        }

        let cache = &self.cache;
        if cache.local_shards == 0 || !cache.local_shards.is_power_of_two() {
            return Err(invalid("cache.local_shards", "must be a power of two"));
        }
        if cache.local_life_window_secs == 0 {
            return Err(invalid("cache.local_life_window_secs", "must be greater than 0"));
        }
        if cache.local_clean_window_secs == 0 {
            return Err(invalid("cache.local_clean_window_secs", "must be greater than 0"));
        }
        if cache.local_hard_max_cache_mb == 0 {
            return Err(invalid("cache.local_hard_max_cache_mb", "must be greater than 0"));
        }
        if cache.local_max_entry_bytes == 0 || cache.local_max_entry_bytes > cache.local_hard_max_bytes() / cache.local_shards {
            return Err(invalid("cache.local_max_entry_bytes", "must be between 1 and the per-shard budget"));
        }

        if cache.redis_enabled && cache.redis_address.trim().is_empty() {
            return Err(invalid("cache.redis_address", "must not be empty when redis is enabled"));
        }
        if cache.redis_min_retry_backoff_ms > cache.redis_max_retry_backoff_ms {
            return Err(invalid("cache.redis_min_retry_backoff_ms", "must not exceed redis_max_retry_backoff_ms"));
        }
        if cache.redis_ttl_secs == 0 {
            return Err(invalid("cache.redis_ttl_secs", "must be greater than 0"));
        }
        if cache.remote_write_timeout_ms == 0 {
            return Err(invalid("cache.remote_write_timeout_ms", "must be greater than 0"));
        }
        if cache.remote_write_queue == 0 {
            return Err(invalid("cache.remote_write_queue", "must be greater than 0"));
        }
        if cache.remote_write_concurrency == 0 {
            return Err(invalid("cache.remote_write_concurrency", "must be greater than 0"));
        }

        if cache.redis_enabled && cache.remote_write_timeout_ms > self.server.shutdown_timeout_ms {
            tracing::warn!(
                remote_write_timeout_ms = cache.remote_write_timeout_ms,
                shutdown_timeout_ms = self.server.shutdown_timeout_ms,
                "remote write timeout exceeds shutdown timeout; pending writes may be abandoned at shutdown"
            );
        }

        Ok(())
    }
}
