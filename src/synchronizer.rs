//! Drains the sync queue into the remote system.
//!
//! Drain triggers:
//! - an unreachable -> reachable transition
//! - an enqueue while reachable
//! - a scheduled backoff retry after a failed drain, while still reachable
//! - an explicit [`Synchronizer::sync_now`]
//!
//! A drain submits items in FIFO order and deletes each one only after its
//! submission succeeded. The first failure stops the pass; the failed item and
//! everything after it stay queued in order. Only one drain runs at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::error::{StoreError, SyncError, SyncSubmissionError};
use crate::sync_queue::{SyncQueue, SyncQueueItem, SyncStatus};

/// The remote-submission collaborator.
#[async_trait]
pub trait RemoteSubmitter: Send + Sync {
    async fn submit(&self, item: &SyncQueueItem) -> Result<(), SyncSubmissionError>;
}

/// Accepts every action after logging it. Stands in when no transport is wired.
pub struct LoggingSubmitter;

#[async_trait]
impl RemoteSubmitter for LoggingSubmitter {
    async fn submit(&self, item: &SyncQueueItem) -> Result<(), SyncSubmissionError> {
        info!("Syncing item {}: {}", item.id, item.action);
        Ok(())
    }
}

#[derive(Debug)]
pub enum DrainOutcome {
    /// Every item present at the start of the pass was delivered.
    Completed { delivered: usize },
    /// A submission failed; `remaining` items (the failed one included) are still queued.
    Stopped {
        delivered: usize,
        remaining: usize,
        error: SyncSubmissionError,
    },
    /// Another drain holds the guard; this trigger was ignored.
    AlreadyRunning,
    Offline,
}

impl DrainOutcome {
    fn needs_retry(&self) -> bool {
        matches!(self, DrainOutcome::Stopped { .. })
    }
}

struct DrainGuard<'a> {
    draining: &'a AtomicBool,
    idle: &'a Notify,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.draining.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

pub struct Synchronizer {
    queue: SyncQueue,
    submitter: Arc<dyn RemoteSubmitter>,
    connectivity: Arc<ConnectivityMonitor>,
    config: SyncConfig,
    draining: AtomicBool,
    idle: Notify,
    trigger: Notify,
}

impl Synchronizer {
    pub fn new(
        queue: SyncQueue,
        submitter: Arc<dyn RemoteSubmitter>,
        connectivity: Arc<ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            queue,
            submitter,
            connectivity,
            config,
            draining: AtomicBool::new(false),
            idle: Notify::new(),
            trigger: Notify::new(),
        }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Appends `action` to the queue. While reachable this also wakes the run
    /// loop for an immediate drain; the local write never waits for it.
    pub async fn enqueue(&self, action: Value) -> Result<u64, StoreError> {
        let id = self.queue.enqueue(action).await?;
        if self.connectivity.is_reachable() {
            self.trigger.notify_one();
        }
        Ok(id)
    }

    /// Resets items a crashed drain left in-flight so they are replayed.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        self.queue.reset_in_flight().await
    }

    /// Runs one drain pass.
    pub async fn drain(&self) -> Result<DrainOutcome, StoreError> {
        if !self.connectivity.is_reachable() {
            debug!("Skipping drain while unreachable");
            return Ok(DrainOutcome::Offline);
        }
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in progress, ignoring trigger");
            return Ok(DrainOutcome::AlreadyRunning);
        }
        let _guard = DrainGuard {
            draining: &self.draining,
            idle: &self.idle,
        };

        let items = self.queue.items().await?;
        let total = items.len();
        if total > 0 {
            info!("Syncing {} offline item(s)...", total);
        }

        let mut delivered = 0;
        for item in items {
            self.queue.set_status(&item, SyncStatus::InFlight).await?;
            match self.submitter.submit(&item).await {
                Ok(()) => {
                    self.queue.remove(item.id).await?;
                    delivered += 1;
                }
                Err(error) => {
                    warn!("Failed to sync item {}: {}", item.id, error);
                    self.queue.set_status(&item, SyncStatus::Pending).await?;
                    return Ok(DrainOutcome::Stopped {
                        delivered,
                        remaining: total - delivered,
                        error,
                    });
                }
            }
        }

        if total > 0 {
            info!("Sync completed: {} item(s) delivered", delivered);
        }
        Ok(DrainOutcome::Completed { delivered })
    }

    /// User-initiated sync. If a background drain is running, waits for it
    /// and then runs a pass of its own. Unlike background drains, a queue that
    /// is still non-empty afterwards is reported as an error.
    pub async fn sync_now(&self) -> Result<usize, SyncError> {
        let delivered = loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            // registered before the attempt so a guard released in between is not missed
            idle.as_mut().enable();

            match self.drain().await? {
                DrainOutcome::Offline => return Err(SyncError::Offline),
                DrainOutcome::Completed { delivered } | DrainOutcome::Stopped { delivered, .. } => {
                    break delivered
                }
                DrainOutcome::AlreadyRunning => {
                    debug!("Waiting for the running drain to finish");
                    idle.await;
                }
            }
        };
        let remaining = self.queue.len().await?;
        if remaining > 0 {
            return Err(SyncError::Incomplete { remaining });
        }
        Ok(delivered)
    }

    /// Event loop reacting to connectivity transitions, enqueue triggers and
    /// backoff timers until `shutdown` flips to `true` or is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut transitions = self.connectivity.subscribe();

        if let Err(e) = self.recover().await {
            warn!("Could not recover in-flight sync items: {}", e);
        }

        let mut retries = 0;
        let mut retry_at = if self.connectivity.is_reachable() {
            self.drain_and_schedule(retries).await
        } else {
            None
        };

        loop {
            let backoff = async move {
                match retry_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = transitions.recv() => match event {
                    Ok(Transition::BecameReachable) => {
                        retries = 0;
                        retry_at = self.drain_and_schedule(retries).await;
                    }
                    Ok(Transition::BecameUnreachable) => {
                        retry_at = None;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} connectivity event(s)", skipped);
                        if self.connectivity.is_reachable() {
                            retries = 0;
                            retry_at = self.drain_and_schedule(retries).await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = self.trigger.notified() => {
                    retries = 0;
                    retry_at = self.drain_and_schedule(retries).await;
                }
                _ = backoff => {
                    retries += 1;
                    retry_at = self.drain_and_schedule(retries).await;
                }
            }
        }
        debug!("Synchronizer stopped");
    }

    /// Drains and returns when the next retry is due, if one is warranted.
    async fn drain_and_schedule(&self, retries: u32) -> Option<Instant> {
        let failed = match self.drain().await {
            Ok(outcome) => outcome.needs_retry(),
            Err(e) => {
                warn!("Sync drain failed: {}", e);
                true
            }
        };

        let policy = &self.config.retry;
        if !failed
            || !self.config.auto_retry
            || !self.connectivity.is_reachable()
            || !policy.should_retry(retries)
        {
            return None;
        }
        let delay = policy.backoff(retries);
        debug!("Retrying sync in {:?} (retry {})", delay, retries + 1);
        Some(Instant::now() + delay)
    }
}
