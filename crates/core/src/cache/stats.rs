//! Hit accounting and snapshots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Which tier satisfied a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HitLevel {
    Miss,
    Local,
    Remote,
}

impl HitLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitLevel::Miss => "miss",
            HitLevel::Local => "local",
            HitLevel::Remote => "remote",
        }
    }

    pub fn is_hit(&self) -> bool {
        !matches!(self, HitLevel::Miss)
    }
}

impl fmt::Display for HitLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the tiered cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheStats {
    /// Live entries in the local tier.
    pub local_entries: usize,
    pub hits_local: u64,
    pub hits_remote: u64,
    pub misses: u64,
    /// Whether a remote tier is configured and connected at startup.
    pub remote_enabled: bool,
    /// Whether the last remote operation succeeded.
    pub remote_alive: bool,
}

#[derive(Debug, Default)]
pub(crate) struct HitCounters {
    local: AtomicU64,
    remote: AtomicU64,
    misses: AtomicU64,
}

impl HitCounters {
    pub(crate) fn record(&self, level: HitLevel) {
        let counter = match level {
            HitLevel::Local => &self.local,
            HitLevel::Remote => &self.remote,
            HitLevel::Miss => &self.misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// (local, remote, misses)
    pub(crate) fn load(&self) -> (u64, u64, u64) {
        (
            self.local.load(Ordering::Relaxed),
            self.remote.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
