//! Cache tier capabilities.
//!
//! Every tier reports genuine absence as `Ok(None)` and reserves `Err` for
//! operational faults, so the tiered cache can tell "not there" apart from
//! "could not ask".

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during tier operations.
#[derive(Debug, Error)]
pub enum TierError {
    /// Failed to reach the backing store.
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation did not finish in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backing store answered with an error.
    #[error("backend error: {0}")]
    Backend(String),

    /// Entry exceeds the tier's per-entry limit.
    #[error("entry of {size} bytes exceeds the {max} byte limit")]
    EntryTooLarge { size: usize, max: usize },

    /// Tier was closed.
    #[error("tier is closed")]
    Closed,
}

/// In-process tier. Synchronous; must never block on I/O.
pub trait LocalTier: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, TierError>;

    /// Insert or replace `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), TierError>;

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry without closing the tier.
    fn clear(&self);

    /// Release background resources. Further calls return [`TierError::Closed`].
    fn close(&self) -> Result<(), TierError>;
}

/// Network-shared tier.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, TierError>;

    /// Insert or replace `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TierError>;

    /// Round-trip liveness probe.
    async fn ping(&self) -> Result<(), TierError>;

    async fn close(&self) -> Result<(), TierError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_error_display() {
        let err = TierError::EntryTooLarge { size: 10, max: 4 };
        assert_eq!(err.to_string(), "entry of 10 bytes exceeds the 4 byte limit");

        let err = TierError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }
}
