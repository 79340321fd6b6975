//! Sharded in-process cache tier.
//!
//! Entries are spread across a fixed number of independently locked shards.
//! Each shard remembers the order in which its entries were populated and
//! evicts from the oldest end, both when its byte budget is exceeded and when
//! the periodic sweep finds entries older than the life window. Reads treat
//! expired entries as absent even before the sweep removes them.

use std::collections::{HashMap, VecDeque};
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use super::tier::{LocalTier, TierError};
use crate::config::CacheConfig;

/// Sizing and expiry settings for [`ShardedLocalCache`].
#[derive(Debug, Clone)]
pub struct LocalTierConfig {
    /// Number of shards; rounded up to a power of two.
    pub shards: usize,
    /// Age after which an entry is expired.
    pub life_window: Duration,
    /// Interval between expiry sweeps.
    pub clean_window: Duration,
    /// Total byte budget across all shards.
    pub hard_max_bytes: usize,
    /// Largest accepted entry (key + value bytes).
    pub max_entry_bytes: usize,
}

impl Default for LocalTierConfig {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for LocalTierConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            shards: config.local_shards,
            life_window: config.local_life_window(),
            clean_window: config.local_clean_window(),
            hard_max_bytes: config.local_hard_max_bytes(),
            max_entry_bytes: config.local_max_entry_bytes,
        }
    }
}

struct Slot {
    value: String,
    seq: u64,
    populated_at: Instant,
    size: usize,
}

#[derive(Default)]
struct Shard {
    entries: HashMap<String, Slot>,
    /// Population order; entries whose `seq` no longer matches are stale.
    order: VecDeque<(u64, String)>,
    bytes: usize,
    next_seq: u64,
}

impl Shard {
    fn get(&self, key: &str, now: Instant, life_window: Duration) -> Option<String> {
        self.entries
            .get(key)
            .filter(|slot| now.duration_since(slot.populated_at) < life_window)
            .map(|slot| slot.value.clone())
    }

    /// Insert and evict down to `capacity`. Returns (inserted_new, evicted).
    fn insert(&mut self, key: &str, value: &str, size: usize, now: Instant, capacity: usize) -> (bool, usize) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let previous = self
            .entries
            .insert(key.to_string(), Slot { value: value.to_string(), seq, populated_at: now, size });
        if let Some(old) = &previous {
            self.bytes -= old.size;
        }
        self.bytes += size;
        self.order.push_back((seq, key.to_string()));

        let mut evicted = 0;
        while self.bytes > capacity {
            match self.pop_oldest() {
                Some(_) => evicted += 1,
                None => break,
            }
        }

        if self.order.len() > self.entries.len() * 2 + 16 {
            self.compact();
        }

        (previous.is_none(), evicted)
    }

    /// Remove the oldest live entry, skipping stale order records.
    fn pop_oldest(&mut self) -> Option<Slot> {
        while let Some((seq, key)) = self.order.pop_front() {
            if self.entries.get(&key).is_some_and(|slot| slot.seq == seq) {
                let slot = self.entries.remove(&key)?;
                self.bytes -= slot.size;
                return Some(slot);
            }
        }
        None
    }

    fn sweep(&mut self, now: Instant, life_window: Duration) -> usize {
        let mut removed = 0;
        while let Some((seq, key)) = self.order.front() {
            let populated_at = self
                .entries
                .get(key)
                .filter(|slot| slot.seq == *seq)
                .map(|slot| slot.populated_at);

            match populated_at {
                Some(at) if now.duration_since(at) < life_window => break,
                Some(_) => {
                    if self.pop_oldest().is_some() {
                        removed += 1;
                    }
                }
                None => {
                    self.order.pop_front();
                }
            }
        }
        removed
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order
            .retain(|(seq, key)| entries.get(key).is_some_and(|slot| slot.seq == *seq));
    }

    fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.order.clear();
        self.bytes = 0;
        removed
    }
}

struct Shards {
    shards: Box<[Mutex<Shard>]>,
    mask: usize,
    hasher: RandomState,
    shard_capacity: usize,
    max_entry_bytes: usize,
    life_window: Duration,
    live: AtomicUsize,
}

impl Shards {
    fn shard(&self, key: &str) -> &Mutex<Shard> {
        let index = (self.hasher.hash_one(key) as usize) & self.mask;
        &self.shards[index]
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            let swept = shard.sweep(now, self.life_window);
            self.live.fetch_sub(swept, Ordering::Relaxed);
            removed += swept;
        }
        removed
    }

    fn clear(&self) {
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            let removed = shard.clear();
            self.live.fetch_sub(removed, Ordering::Relaxed);
        }
    }
}

/// Bounded, sharded, time-windowed in-process cache.
pub struct ShardedLocalCache {
    inner: Arc<Shards>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ShardedLocalCache {
    /// Build the cache and start its expiry sweeper.
    ///
    /// The sweeper runs on the current Tokio runtime; outside a runtime the
    /// cache still works but expired entries are only dropped by eviction.
    pub fn new(config: LocalTierConfig) -> Self {
        let shard_count = config.shards.max(1).next_power_of_two();
        let shard_capacity = (config.hard_max_bytes / shard_count).max(1);
        let shards: Box<[Mutex<Shard>]> = (0..shard_count).map(|_| Mutex::new(Shard::default())).collect();

        let inner = Arc::new(Shards {
            shards,
            mask: shard_count - 1,
            hasher: RandomState::new(),
            shard_capacity,
            max_entry_bytes: config.max_entry_bytes.min(shard_capacity),
            life_window: config.life_window,
            live: AtomicUsize::new(0),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(sweep_loop(Arc::downgrade(&inner), config.clean_window, shutdown_rx))),
            Err(_) => {
                debug!("no tokio runtime, local cache sweeper disabled");
                None
            }
        };

        debug!(
            shards = shard_count,
            shard_capacity,
            life_window_secs = config.life_window.as_secs(),
            "local cache tier created"
        );

        Self { inner, closed: AtomicBool::new(false), shutdown, sweeper: Mutex::new(sweeper) }
    }

    /// Remove every expired entry now. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep(Instant::now())
    }

    fn ensure_open(&self) -> Result<(), TierError> {
        if self.closed.load(Ordering::Acquire) { Err(TierError::Closed) } else { Ok(()) }
    }
}

async fn sweep_loop(shards: Weak<Shards>, clean_window: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(clean_window.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(shards) = shards.upgrade() else { break };
                let removed = shards.sweep(Instant::now());
                if removed > 0 {
                    debug!(removed, "swept expired local cache entries");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

impl LocalTier for ShardedLocalCache {
    fn get(&self, key: &str) -> Result<Option<String>, TierError> {
        self.ensure_open()?;
        let shard = self.inner.shard(key).lock();
        Ok(shard.get(key, Instant::now(), self.inner.life_window))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TierError> {
        self.ensure_open()?;
        let size = key.len() + value.len();
        if size > self.inner.max_entry_bytes {
            return Err(TierError::EntryTooLarge { size, max: self.inner.max_entry_bytes });
        }

        // occupancy is adjusted under the shard lock so a concurrent sweep
        // never observes the entry before it is counted
        let mut shard = self.inner.shard(key).lock();
        let (inserted, evicted) = shard.insert(key, value, size, Instant::now(), self.inner.shard_capacity);
        if inserted {
            self.inner.live.fetch_add(1, Ordering::Relaxed);
        }
        if evicted > 0 {
            self.inner.live.fetch_sub(evicted, Ordering::Relaxed);
        }
        drop(shard);

        if evicted > 0 {
            debug!(evicted, "local cache shard over capacity");
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.inner.live.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn close(&self) -> Result<(), TierError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TierError::Closed);
        }
        let _ = self.shutdown.send(true);
        self.sweeper.lock().take();
        self.inner.clear();
        Ok(())
    }
}
