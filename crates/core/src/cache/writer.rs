//! Detached propagation of fresh entries to the remote tier.
//!
//! Writes are queued on a bounded channel and executed by a dedicated task,
//! so they outlive the request that produced them and never block it. The
//! task runs at most `concurrency` writes at once, each under its own timeout.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::health::RemoteHealth;
use super::tier::{RemoteTier, TierError};

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Remote entry TTL.
    pub ttl: Duration,
    /// Per-write timeout, independent of any request deadline.
    pub write_timeout: Duration,
    /// Queued writes beyond this are dropped.
    pub queue_capacity: usize,
    /// Writes in flight at once.
    pub concurrency: usize,
}

struct WriteJob {
    key: String,
    value: String,
}

pub(crate) struct RemoteWriter {
    sender: Mutex<Option<mpsc::Sender<WriteJob>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteWriter {
    /// Start the writer task on the current runtime.
    pub(crate) fn spawn(tier: Arc<dyn RemoteTier>, health: Arc<RemoteHealth>, config: WriterConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let task = tokio::spawn(run(tier, health, config, receiver));
        Self { sender: Mutex::new(Some(sender)), task: Mutex::new(Some(task)) }
    }

    /// Queue a write without waiting. Returns false if it was dropped.
    pub(crate) fn submit(&self, key: &str, value: &str) -> bool {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            debug!(key, "remote writer stopped, write skipped");
            return false;
        };

        match sender.try_send(WriteJob { key: key.to_string(), value: value.to_string() }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(key = %job.key, "remote write queue full, write dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                debug!(key = %job.key, "remote writer stopped, write skipped");
                false
            }
        }
    }

    /// Stop accepting writes and wait up to `grace` for queued ones.
    ///
    /// Writes still pending after `grace` are abandoned. Returns true if the
    /// queue drained in time.
    pub(crate) async fn shutdown(&self, grace: Duration) -> bool {
        self.sender.lock().take();
        let Some(mut task) = self.task.lock().take() else {
            return true;
        };

        match timeout(grace, &mut task).await {
            Ok(_) => true,
            Err(_) => {
                task.abort();
                warn!(grace_ms = grace.as_millis() as u64, "remote writes still pending at shutdown, abandoned");
                false
            }
        }
    }
}

async fn run(
    tier: Arc<dyn RemoteTier>, health: Arc<RemoteHealth>, config: WriterConfig, mut receiver: mpsc::Receiver<WriteJob>,
) {
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut in_flight = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };

        let tier = Arc::clone(&tier);
        let health = Arc::clone(&health);
        let (ttl, write_timeout) = (config.ttl, config.write_timeout);

        in_flight.spawn(async move {
            let _permit = permit;
            let result = match timeout(write_timeout, tier.set(&job.key, &job.value, ttl)).await {
                Ok(result) => result,
                Err(_) => Err(TierError::Timeout(write_timeout)),
            };

            match result {
                Ok(()) => {
                    health.observe_success();
                }
                Err(e) => {
                    warn!(tier = tier.name(), key = %job.key, error = %e, "remote cache write failed");
                    health.observe_failure();
                }
            }
        });

        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
}
