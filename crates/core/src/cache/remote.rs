//! Redis-backed shared cache tier.
//!
//! Uses `redis::aio::ConnectionManager` for a multiplexed connection with
//! automatic reconnection. Dial timeout, response timeout, retry count and
//! backoff bounds all come from [`CacheConfig`].

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{IntoConnectionInfo, RedisError};
use tokio::time::timeout;
use tracing::debug;

use super::tier::{RemoteTier, TierError};
use crate::config::CacheConfig;

/// Shared cache tier backed by a Redis (or protocol-compatible) server.
pub struct RedisTier {
    connection: Mutex<Option<ConnectionManager>>,
    address: String,
    write_timeout: Duration,
}

impl std::fmt::Debug for RedisTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTier")
            .field("address", &self.address)
            .field("connected", &self.connection.lock().is_some())
            .finish()
    }
}

impl RedisTier {
    /// Connect using the `redis_*` settings of `config`.
    ///
    /// Fails if the server cannot be reached within the dial timeout and
    /// configured retries.
    pub async fn connect(config: &CacheConfig) -> Result<Self, TierError> {
        let mut info = format!("redis://{}/{}", config.redis_address, config.redis_db)
            .into_connection_info()
            .map_err(|e| TierError::Connection(format!("invalid redis address {}: {e}", config.redis_address)))?;
        info.redis.password = config.redis_password.clone();

        let client = redis::Client::open(info)
            .map_err(|e| TierError::Connection(format!("failed to create redis client: {e}")))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.redis_dial_timeout())
            .set_response_timeout(config.redis_read_timeout())
            .set_number_of_retries(config.redis_max_retries)
            .set_factor(config.redis_min_retry_backoff_ms)
            .set_max_delay(config.redis_max_retry_backoff_ms);

        // every retry may take a full dial timeout plus the longest backoff
        let attempts = config.redis_max_retries as u32 + 1;
        let connect_budget = (config.redis_dial_timeout() + config.redis_max_retry_backoff()) * attempts;

        let manager = timeout(connect_budget, ConnectionManager::new_with_config(client, manager_config))
            .await
            .map_err(|_| TierError::Timeout(connect_budget))?
            .map_err(|e| TierError::Connection(format!("failed to connect to redis: {e}")))?;

        debug!(address = %config.redis_address, db = config.redis_db, "redis cache tier connected");

        Ok(Self {
            connection: Mutex::new(Some(manager)),
            address: config.redis_address.clone(),
            write_timeout: config.redis_write_timeout(),
        })
    }

    fn connection(&self) -> Result<ConnectionManager, TierError> {
        self.connection.lock().clone().ok_or(TierError::Closed)
    }
}

/// Map a client error onto the tier taxonomy.
fn classify(err: RedisError) -> TierError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
        TierError::Connection(err.to_string())
    } else {
        TierError::Backend(err.to_string())
    }
}

#[async_trait]
impl RemoteTier for RedisTier {
    async fn get(&self, key: &str) -> Result<Option<String>, TierError> {
        let mut conn = self.connection()?;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TierError> {
        let mut conn = self.connection()?;
        let ttl_ms = (ttl.as_millis() as u64).max(1);

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(ttl_ms);

        timeout(self.write_timeout, cmd.query_async::<()>(&mut conn))
            .await
            .map_err(|_| TierError::Timeout(self.write_timeout))?
            .map_err(classify)?;

        debug!(key, ttl_ms, "redis SET");
        Ok(())
    }

    async fn ping(&self) -> Result<(), TierError> {
        let mut conn = self.connection()?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await.map_err(classify)?;
        if pong == "PONG" { Ok(()) } else { Err(TierError::Backend(format!("unexpected PING reply: {pong}"))) }
    }

    async fn close(&self) -> Result<(), TierError> {
        // the manager disconnects once its last clone is dropped
        self.connection.lock().take().map(drop).ok_or(TierError::Closed)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::ErrorKind;

    #[test]
    fn test_classify_io_error_as_connection() {
        let err = RedisError::from((ErrorKind::IoError, "broken pipe"));
        assert!(matches!(classify(err), TierError::Connection(_)));
    }

    #[test]
    fn test_classify_response_error_as_backend() {
        let err = RedisError::from((ErrorKind::ResponseError, "WRONGTYPE"));
        assert!(matches!(classify(err), TierError::Backend(_)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let config = CacheConfig {
            redis_enabled: true,
            redis_address: "127.0.0.1:1".into(),
            redis_dial_timeout_ms: 200,
            redis_max_retries: 0,
            ..Default::default()
        };
        assert!(RedisTier::connect(&config).await.is_err());
    }

    // Requires a running Redis at MATHSVG_TEST_REDIS_ADDRESS (default localhost:6379)
    mod integration {
        use super::*;

        fn test_config() -> CacheConfig {
            CacheConfig {
                redis_enabled: true,
                redis_address: std::env::var("MATHSVG_TEST_REDIS_ADDRESS").unwrap_or_else(|_| "localhost:6379".into()),
                ..Default::default()
            }
        }

        #[tokio::test]
        #[ignore = "requires a running redis server"]
        async fn test_redis_set_get_close() {
            let tier = RedisTier::connect(&test_config()).await.unwrap();
            tier.ping().await.unwrap();

            let key = format!("mathsvg:test:{}", std::process::id());
            assert_eq!(tier.get(&key).await.unwrap(), None);

            tier.set(&key, "<svg/>", Duration::from_secs(5)).await.unwrap();
            assert_eq!(tier.get(&key).await.unwrap().as_deref(), Some("<svg/>"));

            tier.close().await.unwrap();
            assert!(matches!(tier.get(&key).await, Err(TierError::Closed)));
            assert!(matches!(tier.close().await, Err(TierError::Closed)));
        }

        #[tokio::test]
        #[ignore = "requires a running redis server"]
        async fn test_redis_ttl_expiry() {
            let tier = RedisTier::connect(&test_config()).await.unwrap();
            let key = format!("mathsvg:test:ttl:{}", std::process::id());

            tier.set(&key, "temporary", Duration::from_millis(200)).await.unwrap();
            assert!(tier.get(&key).await.unwrap().is_some());

            tokio::time::sleep(Duration::from_millis(400)).await;
            assert!(tier.get(&key).await.unwrap().is_none());
        }
    }
}
