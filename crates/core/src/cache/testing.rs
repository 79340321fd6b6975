//! Test doubles for cache tiers and log capture.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;

use super::tier::{RemoteTier, TierError};

/// In-memory remote tier that can be switched into a failing state.
///
/// Clones share the same store, which stands in for a server shared by
/// several service instances.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    store: Arc<Mutex<HashMap<String, (String, Duration)>>>,
    failing: Arc<AtomicBool>,
    latency: Arc<Mutex<Duration>>,
    calls: Arc<AtomicUsize>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Total get/set/ping calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.store.lock().get(key).map(|(value, _)| value.clone())
    }

    pub fn stored_ttl(&self, key: &str) -> Option<Duration> {
        self.store.lock().get(key).map(|(_, ttl)| *ttl)
    }

    /// Poll until `key` is stored or `within` elapses.
    pub async fn wait_for(&self, key: &str, within: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if let Some(value) = self.stored(key) {
                return Some(value);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn enter(&self) -> Result<(), TierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TierError::Connection("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTier for MemoryRemote {
    async fn get(&self, key: &str) -> Result<Option<String>, TierError> {
        self.enter().await?;
        Ok(self.stored(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TierError> {
        self.enter().await?;
        self.store.lock().insert(key.to_string(), (value.to_string(), ttl));
        Ok(())
    }

    async fn ping(&self) -> Result<(), TierError> {
        self.enter().await
    }

    async fn close(&self) -> Result<(), TierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TierError::Connection("connection reset".into()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Captured `(level, message)` pairs.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedLogs {
    pub fn count(&self, level: Level, message: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(l, m)| *l == level && m == message)
            .count()
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.logs.events.lock().push((*event.metadata().level(), visitor.0));
    }
}

/// Capture events on this thread until the guard drops.
///
/// Pair with a current-thread runtime so spawned tasks log on the same thread.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = Registry::default().with(CaptureLayer { logs: logs.clone() });
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
