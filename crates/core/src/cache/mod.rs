//! Tiered formula cache.
//!
//! ## Architecture
//!
//! - **Local tier** ([`ShardedLocalCache`]): in-process, sharded, byte-bounded,
//!   time-windowed expiry
//! - **Remote tier** ([`RedisTier`]): network, shared across instances,
//!   per-entry TTL
//! - **Manager** ([`TieredCache`]): lookup order, write-back, hit accounting
//!   and remote health
//!
//! ## Cache Hierarchy
//!
//! ```text
//! lookup → local → remote → render
//!            ↓        ↓
//!         backfill ←──┘
//! ```
//!
//! ## Graceful Degradation
//!
//! If the remote tier is disabled, unreachable at startup, or failing at
//! runtime, lookups fall back to local-only behaviour and writes are dropped
//! after logging. Cache faults never surface as request errors.

pub mod hash;
pub mod health;
pub mod local;
pub mod manager;
pub mod remote;
pub mod stats;
pub mod tier;
mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::Error;

pub use hash::{Fingerprint, fingerprint};
pub use health::{HealthState, RemoteHealth};
pub use local::{LocalTierConfig, ShardedLocalCache};
pub use manager::{TieredCache, TieredOptions};
pub use remote::RedisTier;
pub use stats::{CacheStats, HitLevel};
pub use tier::{LocalTier, RemoteTier, TierError};
pub use writer::WriterConfig;
