//! Tiered cache: local tier in front of an optional shared remote tier.
//!
//! ## Lookup
//!
//! ```text
//! get → local ──hit──────────────────────────────→ (value, Local)
//!         │ miss
//!         └→ remote (bounded by caller deadline)
//!              ├─ value    → backfill local, mark alive → (value, Remote)
//!              ├─ absent   →                            → (None, Miss)
//!              └─ failure  → warn, mark dead           → (None, Miss)
//! ```
//!
//! ## Write
//!
//! `set` writes the local tier synchronously and hands the remote write to a
//! background writer with its own timeout, so a cancelled request still
//! populates the shared tier for other instances.
//!
//! Cache faults never reach the caller: the worst outcome of any lookup is a
//! miss, after which the caller computes the value itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use super::hash::Fingerprint;
use super::health::RemoteHealth;
use super::local::{LocalTierConfig, ShardedLocalCache};
use super::remote::RedisTier;
use super::stats::{CacheStats, HitCounters, HitLevel};
use super::tier::{LocalTier, RemoteTier, TierError};
use super::writer::{RemoteWriter, WriterConfig};
use crate::Error;
use crate::config::CacheConfig;

/// Remote propagation and shutdown settings.
#[derive(Debug, Clone)]
pub struct TieredOptions {
    pub writer: WriterConfig,
    /// Longest `close` waits for queued remote writes.
    pub shutdown_grace: Duration,
}

impl Default for TieredOptions {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for TieredOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            writer: WriterConfig {
                ttl: config.redis_ttl(),
                write_timeout: config.remote_write_timeout(),
                queue_capacity: config.remote_write_queue,
                concurrency: config.remote_write_concurrency,
            },
            shutdown_grace: config.remote_write_timeout(),
        }
    }
}

struct Remote {
    tier: Arc<dyn RemoteTier>,
    writer: RemoteWriter,
}

struct Inner {
    local: Arc<dyn LocalTier>,
    remote: Option<Remote>,
    health: Arc<RemoteHealth>,
    counters: HitCounters,
    shutdown_grace: Duration,
    closed: AtomicBool,
}

/// Two-tier cache shared by all request handlers. Cheap to clone.
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("local_entries", &self.inner.local.len())
            .field("remote", &self.inner.remote.as_ref().map(|r| r.tier.name()))
            .field("health", &self.inner.health.state())
            .finish()
    }
}

impl TieredCache {
    /// Build the tiers described by `config`.
    ///
    /// A configured remote tier that cannot be reached at startup is dropped
    /// with a warning; the cache then runs local-only for the process
    /// lifetime.
    pub async fn connect(config: &CacheConfig) -> Result<Self, Error> {
        let local: Arc<dyn LocalTier> = Arc::new(ShardedLocalCache::new(LocalTierConfig::from(config)));

        if !config.redis_enabled {
            debug!("remote cache disabled, running local tier only");
            return Ok(Self::new(local, None, TieredOptions::from(config)));
        }

        let remote = match RedisTier::connect(config).await {
            Ok(tier) => match tier.ping().await {
                Ok(()) => Some(Arc::new(tier) as Arc<dyn RemoteTier>),
                Err(e) => {
                    warn!(address = %config.redis_address, error = %e, "redis ping failed, falling back to local tier only");
                    let _ = tier.close().await;
                    None
                }
            },
            Err(e) => {
                warn!(address = %config.redis_address, error = %e, "redis unreachable, falling back to local tier only");
                None
            }
        };

        let cache = Self::new(local, remote, TieredOptions::from(config));
        if cache.inner.remote.is_some() {
            cache.inner.health.observe_success();
        }
        Ok(cache)
    }

    /// Assemble a cache from existing tiers.
    ///
    /// With a remote tier this spawns the background writer, so it must be
    /// called inside a Tokio runtime.
    pub fn new(local: Arc<dyn LocalTier>, remote: Option<Arc<dyn RemoteTier>>, options: TieredOptions) -> Self {
        let (remote, health) = match remote {
            Some(tier) => {
                let health = Arc::new(RemoteHealth::new(tier.name()));
                let writer = RemoteWriter::spawn(Arc::clone(&tier), Arc::clone(&health), options.writer);
                (Some(Remote { tier, writer }), health)
            }
            None => (None, Arc::new(RemoteHealth::disabled())),
        };

        Self {
            inner: Arc::new(Inner {
                local,
                remote,
                health,
                counters: HitCounters::default(),
                shutdown_grace: options.shutdown_grace,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Look `key` up, local tier first.
    ///
    /// The remote lookup is abandoned at `deadline`, which counts as a remote
    /// failure.
    pub async fn get(&self, key: &Fingerprint, deadline: Instant) -> (Option<String>, HitLevel) {
        let inner = &self.inner;
        let key = key.as_str();

        match inner.local.get(key) {
            Ok(Some(value)) => {
                inner.counters.record(HitLevel::Local);
                return (Some(value), HitLevel::Local);
            }
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "local cache read failed"),
        }

        let Some(remote) = &inner.remote else {
            inner.counters.record(HitLevel::Miss);
            return (None, HitLevel::Miss);
        };

        let budget = deadline.saturating_duration_since(Instant::now());
        let result = match timeout(budget, remote.tier.get(key)).await {
            Ok(result) => result,
            Err(_) => Err(TierError::Timeout(budget)),
        };

        match result {
            Ok(Some(value)) => {
                inner.counters.record(HitLevel::Remote);
                inner.health.observe_success();
                if let Err(e) = inner.local.set(key, &value) {
                    warn!(key, error = %e, "local cache backfill failed");
                }
                (Some(value), HitLevel::Remote)
            }
            Ok(None) => {
                inner.counters.record(HitLevel::Miss);
                (None, HitLevel::Miss)
            }
            Err(e) => {
                warn!(tier = remote.tier.name(), key, error = %e, "remote cache read failed");
                inner.health.observe_failure();
                inner.counters.record(HitLevel::Miss);
                (None, HitLevel::Miss)
            }
        }
    }

    /// Store `value` locally and queue it for the remote tier.
    ///
    /// Never blocks on the network and never fails.
    pub fn set(&self, key: &Fingerprint, value: &str) {
        let key = key.as_str();
        if let Err(e) = self.inner.local.set(key, value) {
            warn!(key, error = %e, "local cache write failed");
        }
        if let Some(remote) = &self.inner.remote
            && !remote.writer.submit(key, value)
        {
            debug!(key, "remote write not queued, entry cached locally only");
        }
    }

    pub fn stats(&self) -> CacheStats {
        let (hits_local, hits_remote, misses) = self.inner.counters.load();
        CacheStats {
            local_entries: self.inner.local.len(),
            hits_local,
            hits_remote,
            misses,
            remote_enabled: self.inner.remote.is_some(),
            remote_alive: self.inner.health.is_alive(),
        }
    }

    /// Drop every local entry. The remote tier is untouched.
    pub fn clear_local(&self) {
        self.inner.local.clear();
    }

    /// Release both tiers.
    ///
    /// Waits at most the shutdown grace period for queued remote writes. Only
    /// a remote close failure is returned; everything else is logged.
    pub async fn close(&self) -> Result<(), Error> {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            debug!("tiered cache already closed");
            return Ok(());
        }

        if let Err(e) = inner.local.close() {
            warn!(error = %e, "local cache close failed");
        }

        let Some(remote) = &inner.remote else {
            return Ok(());
        };

        remote.writer.shutdown(inner.shutdown_grace).await;
        remote.tier.close().await.map_err(|e| {
            warn!(tier = remote.tier.name(), error = %e, "remote cache close failed");
            Error::Cache(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::hash::fingerprint;
    use crate::cache::testing::{MemoryRemote, capture_logs};
    use tracing::Level;

    const SETTLE: Duration = Duration::from_secs(2);

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(1)
    }

    fn local() -> Arc<dyn LocalTier> {
        Arc::new(ShardedLocalCache::new(LocalTierConfig::default()))
    }

    fn with_remote(remote: &MemoryRemote) -> TieredCache {
        TieredCache::new(local(), Some(Arc::new(remote.clone())), TieredOptions::default())
    }

    #[tokio::test]
    async fn test_unwritten_key_misses() {
        let cache = TieredCache::new(local(), None, TieredOptions::default());
        let (value, level) = cache.get(&fingerprint("never written"), deadline()).await;
        assert_eq!(value, None);
        assert_eq!(level, HitLevel::Miss);
    }

    #[tokio::test]
    async fn test_set_then_get_hits_local() {
        let cache = TieredCache::new(local(), None, TieredOptions::default());
        let key = fingerprint("x^2");
        cache.set(&key, "<svg>x</svg>");

        let (value, level) = cache.get(&key, deadline()).await;
        assert_eq!(value.as_deref(), Some("<svg>x</svg>"));
        assert_eq!(level, HitLevel::Local);
    }

    #[tokio::test]
    async fn test_formula_scenario() {
        let cache = TieredCache::new(local(), None, TieredOptions::default());
        let normalized = "E=mc^2";
        let fp = fingerprint(normalized);
        assert_eq!(fp, fingerprint(normalized));

        assert_eq!(cache.get(&fp, deadline()).await, (None, HitLevel::Miss));
        cache.set(&fp, "<svg>...</svg>");
        assert_eq!(cache.get(&fp, deadline()).await, (Some("<svg>...</svg>".to_string()), HitLevel::Local));
    }

    #[tokio::test]
    async fn test_remote_disabled_is_local_only() {
        let cache = TieredCache::new(local(), None, TieredOptions::default());
        let key = fingerprint("a+b");
        cache.set(&key, "<svg/>");
        cache.get(&key, deadline()).await;
        cache.get(&fingerprint("other"), deadline()).await;

        let stats = cache.stats();
        assert!(!stats.remote_enabled);
        assert!(!stats.remote_alive);
        assert_eq!((stats.hits_local, stats.hits_remote, stats.misses), (1, 0, 1));
        assert!(cache.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_local_hit_skips_remote() {
        let remote = MemoryRemote::new();
        let cache = with_remote(&remote);
        let key = fingerprint("local only");
        cache.set(&key, "<svg/>");
        remote.wait_for(key.as_str(), SETTLE).await.unwrap();
        let calls = remote.calls();

        assert_eq!(cache.get(&key, deadline()).await.1, HitLevel::Local);
        assert_eq!(remote.calls(), calls);
    }

    #[tokio::test]
    async fn test_cross_instance_read_backfills_local() {
        let shared = MemoryRemote::new();
        let writer = with_remote(&shared);
        let reader = with_remote(&shared);
        let key = fingerprint("\\sum_{i=1}^n i");

        writer.set(&key, "<svg>sum</svg>");
        shared.wait_for(key.as_str(), SETTLE).await.unwrap();

        let (value, level) = reader.get(&key, deadline()).await;
        assert_eq!(value.as_deref(), Some("<svg>sum</svg>"));
        assert_eq!(level, HitLevel::Remote);

        let (value, level) = reader.get(&key, deadline()).await;
        assert_eq!(value.as_deref(), Some("<svg>sum</svg>"));
        assert_eq!(level, HitLevel::Local);

        let stats = reader.stats();
        assert_eq!((stats.hits_local, stats.hits_remote, stats.misses), (1, 1, 0));
        assert!(stats.remote_alive);
    }

    #[tokio::test]
    async fn test_cleared_local_reads_from_remote() {
        let remote = MemoryRemote::new();
        let cache = with_remote(&remote);
        let key = fingerprint("\\int_0^1 x dx");
        cache.set(&key, "<svg>int</svg>");
        remote.wait_for(key.as_str(), SETTLE).await.unwrap();

        cache.clear_local();
        assert_eq!(cache.get(&key, deadline()).await.1, HitLevel::Remote);
        assert_eq!(cache.get(&key, deadline()).await.1, HitLevel::Local);
    }

    #[tokio::test]
    async fn test_remote_write_uses_configured_ttl() {
        let remote = MemoryRemote::new();
        let mut options = TieredOptions::default();
        options.writer.ttl = Duration::from_secs(42);
        let cache = TieredCache::new(local(), Some(Arc::new(remote.clone())), options);
        let key = fingerprint("ttl");

        cache.set(&key, "<svg/>");
        remote.wait_for(key.as_str(), SETTLE).await.unwrap();
        assert_eq!(remote.stored_ttl(key.as_str()), Some(Duration::from_secs(42)));
    }

    #[tokio::test]
    async fn test_remote_failure_degrades_to_miss() {
        let remote = MemoryRemote::new();
        remote.set_failing(true);
        let cache = with_remote(&remote);

        let (value, level) = cache.get(&fingerprint("y"), deadline()).await;
        assert_eq!((value, level), (None, HitLevel::Miss));

        let stats = cache.stats();
        assert!(stats.remote_enabled);
        assert!(!stats.remote_alive);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_remote_absence_keeps_health() {
        let remote = MemoryRemote::new();
        let cache = with_remote(&remote);
        let key = fingerprint("warm");
        cache.set(&key, "<svg/>");
        remote.wait_for(key.as_str(), SETTLE).await.unwrap();
        assert!(cache.stats().remote_alive);

        assert_eq!(cache.get(&fingerprint("absent"), deadline()).await.1, HitLevel::Miss);
        assert!(cache.stats().remote_alive);
    }

    #[tokio::test]
    async fn test_remote_deadline_counts_as_failure() {
        let remote = MemoryRemote::new();
        remote.set_latency(Duration::from_millis(200));
        let cache = with_remote(&remote);

        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(cache.get(&fingerprint("slow"), deadline).await, (None, HitLevel::Miss));
        assert!(!cache.stats().remote_alive);
    }

    #[tokio::test]
    async fn test_repeated_failures_log_one_transition() {
        let (logs, _guard) = capture_logs();
        let remote = MemoryRemote::new();
        let cache = with_remote(&remote);

        // reach alive through a successful read
        let key = fingerprint("seed");
        remote.set(key.as_str(), "<svg/>", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(&key, deadline()).await.1, HitLevel::Remote);
        assert!(cache.stats().remote_alive);

        remote.set_failing(true);
        for formula in ["a", "b", "c"] {
            assert_eq!(cache.get(&fingerprint(formula), deadline()).await.1, HitLevel::Miss);
        }

        let dead = "remote cache unavailable, serving from local tier only";
        assert_eq!(logs.count(Level::WARN, dead), 1);
        assert_eq!(logs.count(Level::WARN, "remote cache read failed"), 3);
    }

    #[tokio::test]
    async fn test_recovery_logs_one_transition() {
        let (logs, _guard) = capture_logs();
        let remote = MemoryRemote::new();
        remote.set_failing(true);
        let cache = with_remote(&remote);

        cache.get(&fingerprint("a"), deadline()).await;
        cache.get(&fingerprint("b"), deadline()).await;
        assert!(!cache.stats().remote_alive);

        remote.set_failing(false);
        let key = fingerprint("recovered");
        remote.set(key.as_str(), "<svg/>", Duration::from_secs(60)).await.unwrap();
        cache.get(&key, deadline()).await;
        cache.get(&fingerprint("absent"), deadline()).await;
        cache.clear_local();
        cache.get(&key, deadline()).await;

        assert_eq!(logs.count(Level::INFO, "remote cache available"), 1);
        assert!(cache.stats().remote_alive);
    }

    #[tokio::test]
    async fn test_failed_remote_write_marks_dead() {
        let (logs, _guard) = capture_logs();
        let remote = MemoryRemote::new();
        let cache = with_remote(&remote);
        let key = fingerprint("first");
        cache.set(&key, "<svg/>");
        remote.wait_for(key.as_str(), SETTLE).await.unwrap();

        remote.set_failing(true);
        for formula in ["w1", "w2", "w3"] {
            cache.set(&fingerprint(formula), "<svg/>");
        }
        cache.close().await.ok();

        assert!(!cache.stats().remote_alive);
        assert_eq!(logs.count(Level::WARN, "remote cache write failed"), 3);
        assert_eq!(logs.count(Level::WARN, "remote cache unavailable, serving from local tier only"), 1);
    }

    #[tokio::test]
    async fn test_dropped_remote_write_still_caches_locally() {
        let remote = MemoryRemote::new();
        remote.set_latency(Duration::from_millis(200));
        let mut options = TieredOptions::default();
        options.writer.queue_capacity = 1;
        options.writer.concurrency = 1;
        let cache = TieredCache::new(local(), Some(Arc::new(remote.clone())), options);

        let keys: Vec<Fingerprint> = (0..5).map(|i| fingerprint(&format!("q{i}"))).collect();
        for key in &keys {
            cache.set(key, "<svg/>");
        }
        for key in &keys {
            assert_eq!(cache.get(key, deadline()).await.1, HitLevel::Local);
        }

        cache.close().await.unwrap();
        assert!(remote.stored(keys[0].as_str()).is_some());
        assert!(remote.stored(keys[4].as_str()).is_none());
    }

    #[tokio::test]
    async fn test_set_survives_local_rejection() {
        let remote = MemoryRemote::new();
        let small = Arc::new(ShardedLocalCache::new(LocalTierConfig {
            max_entry_bytes: 80,
            ..LocalTierConfig::default()
        }));
        let cache = TieredCache::new(small, Some(Arc::new(remote.clone())), TieredOptions::default());
        let key = fingerprint("big");
        let big = "x".repeat(1000);

        cache.set(&key, &big);
        assert_eq!(remote.wait_for(key.as_str(), SETTLE).await.as_deref(), Some(big.as_str()));
        // local refused it, so the lookup falls through to the remote tier
        assert_eq!(cache.get(&key, deadline()).await.1, HitLevel::Remote);
    }

    #[tokio::test]
    async fn test_close_propagates_remote_failure_only() {
        let remote = MemoryRemote::new();
        let cache = with_remote(&remote);
        remote.set_failing(true);

        let result = cache.close().await;
        assert!(matches!(result, Err(Error::Cache(TierError::Connection(_)))));
        // second close is a no-op
        assert!(cache.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_bounds_pending_writes() {
        let remote = MemoryRemote::new();
        remote.set_latency(Duration::from_secs(30));
        let mut options = TieredOptions::default();
        options.shutdown_grace = Duration::from_millis(50);
        let cache = TieredCache::new(local(), Some(Arc::new(remote.clone())), options);

        cache.set(&fingerprint("stuck"), "<svg/>");
        let started = std::time::Instant::now();
        cache.close().await.ok();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stats_match_concurrent_tallies() {
        let remote = MemoryRemote::new();
        let cache = with_remote(&remote);
        let keys: Vec<Fingerprint> = (0..16).map(|i| fingerprint(&format!("f{i}"))).collect();

        // half the keys exist only remotely, a quarter locally as well
        for key in keys.iter().take(8) {
            remote.set(key.as_str(), "<svg/>", Duration::from_secs(60)).await.unwrap();
        }
        for key in keys.iter().take(4) {
            cache.set(key, "<svg/>");
        }

        let mut handles = Vec::new();
        for worker in 0..8 {
            let cache = cache.clone();
            let keys = keys.clone();
            handles.push(tokio::spawn(async move {
                let mut tally = [0u64; 3];
                for round in 0..50 {
                    let key = &keys[(worker + round) % keys.len()];
                    if round % 7 == 0 {
                        cache.set(key, "<svg/>");
                    }
                    let (_, level) = cache.get(key, Instant::now() + Duration::from_secs(5)).await;
                    match level {
                        HitLevel::Local => tally[0] += 1,
                        HitLevel::Remote => tally[1] += 1,
                        HitLevel::Miss => tally[2] += 1,
                    }
                }
                tally
            }));
        }

        let mut expected = [0u64; 3];
        for handle in handles {
            let tally = handle.await.unwrap();
            for (total, count) in expected.iter_mut().zip(tally) {
                *total += count;
            }
        }

        let stats = cache.stats();
        assert_eq!([stats.hits_local, stats.hits_remote, stats.misses], expected);
        assert_eq!(expected.iter().sum::<u64>(), 400);
    }
}
