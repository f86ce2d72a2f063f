//! Background sync queue for failed mutating requests.
//!
//! ### Item lifecycle
//! queued -> processing -> succeeded (removed)
//!                      -> retry scheduled -> queued
//!                      -> permanently failed (removed)
//!
//! The `sync_queue` table is the source of truth. Every mutation is written
//! to it first, then mirrored in memory, then published to listeners: the
//! full snapshot on a `watch` channel and the matching `WorkerMessage` on the
//! broadcast channel.
//!
//! Retry timers only carry the item id. Each attempt re-reads the item and
//! skips it when it has already left the queue or another attempt is running.
//! An item owns at most one timer; `process` leaves items with a pending
//! timer alone so their backoff is never shortened.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use swcache_core::config::SyncConfig;
use swcache_core::{CacheDb, Error, SyncQueueItem, WorkerMessage};
use tokio::sync::{broadcast, watch};

use crate::fetch::Fetcher;
use crate::request::Request;

/// Totals for one `process` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct SyncReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retrying: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Succeeded,
    Failed,
    Retry(Duration),
    /// Gone from the queue or already being attempted.
    Skipped,
}

/// Durable FIFO of failed mutating requests with bounded retries.
pub struct SyncQueue {
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    policy: SyncConfig,
    items: Mutex<Vec<SyncQueueItem>>,
    in_flight: Mutex<HashSet<String>>,
    /// Ids with a retry timer pending.
    scheduled: Mutex<HashSet<String>>,
    processing: AtomicBool,
    counter: AtomicU64,
    snapshots: watch::Sender<Vec<SyncQueueItem>>,
    events: broadcast::Sender<WorkerMessage>,
}

impl SyncQueue {
    /// Reload the persisted queue.
    pub async fn load(
        db: CacheDb, fetcher: Arc<dyn Fetcher>, policy: SyncConfig, events: broadcast::Sender<WorkerMessage>,
    ) -> Result<Arc<Self>, Error> {
        let items = db.load_sync_items().await?;
        if !items.is_empty() {
            tracing::info!(count = items.len(), "restored queued requests");
        }

        let (snapshots, _) = watch::channel(items.clone());

        Ok(Arc::new(Self {
            db,
            fetcher,
            policy,
            items: Mutex::new(items),
            in_flight: Mutex::new(HashSet::new()),
            scheduled: Mutex::new(HashSet::new()),
            processing: AtomicBool::new(false),
            counter: AtomicU64::new(0),
            snapshots,
            events,
        }))
    }

    /// Current queue contents in arrival order.
    pub fn items(&self) -> Vec<SyncQueueItem> {
        self.lock_items().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_items().is_empty()
    }

    /// Listen for full snapshots after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<SyncQueueItem>> {
        self.snapshots.subscribe()
    }

    /// Queue a request for replay.
    pub async fn add(&self, request: &Request) -> Result<SyncQueueItem, Error> {
        let serialized = request.to_serialized();
        let timestamp = Utc::now().timestamp_millis();
        let item = SyncQueueItem {
            id: self.next_id(&serialized.url, timestamp),
            url: serialized.url.clone(),
            method: serialized.method.clone(),
            headers: serialized.headers.clone(),
            body: serialized.body.clone(),
            timestamp,
            retry_count: 0,
            max_retries: self.policy.max_retries,
        };

        self.db.insert_sync_item(&item).await?;
        self.lock_items().push(item.clone());
        self.publish();
        self.emit(WorkerMessage::AddToSyncQueue { request: serialized });

        tracing::info!(id = %item.id, url = %item.url, method = %item.method, "queued request for background sync");
        Ok(item)
    }

    /// Drop an item without replaying it.
    pub async fn remove(&self, id: &str) -> Result<bool, Error> {
        let removed = self.forget(id).await?;
        if removed {
            self.emit(WorkerMessage::RemoveSyncItem { id: id.to_string() });
        }
        Ok(removed)
    }

    /// Replay every queued item once, sequentially.
    ///
    /// A no-op when a run is already in progress or the queue is empty.
    /// Items that fail but have retries left get a backoff timer.
    pub async fn process(self: &Arc<Self>) -> SyncReport {
        let mut report = SyncReport::default();

        if self.processing.swap(true, Ordering::SeqCst) {
            tracing::debug!("sync already in progress");
            return report;
        }
        let _guard = FlagGuard(&self.processing);

        let ids: Vec<String> = self.lock_items().iter().map(|item| item.id.clone()).collect();
        if ids.is_empty() {
            return report;
        }

        tracing::info!(count = ids.len(), "processing sync queue");

        for id in ids {
            if self.is_scheduled(&id) {
                tracing::debug!(id = %id, "retry already scheduled");
                continue;
            }
            match self.attempt(&id).await {
                Ok(Attempt::Succeeded) => report.succeeded += 1,
                Ok(Attempt::Failed) => report.failed += 1,
                Ok(Attempt::Retry(delay)) => {
                    report.retrying += 1;
                    self.schedule_retry(id, delay);
                }
                Ok(Attempt::Skipped) => continue,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "failed to persist sync queue change");
                    continue;
                }
            }
            report.attempted += 1;
        }

        report
    }

    fn schedule_retry(self: &Arc<Self>, id: String, delay: Duration) {
        if !lock(&self.scheduled).insert(id.clone()) {
            return;
        }
        tracing::debug!(id = %id, delay_ms = delay.as_millis() as u64, "scheduling sync retry");
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let mut delay = delay;
            loop {
                tokio::time::sleep(delay).await;
                match queue.attempt(&id).await {
                    Ok(Attempt::Retry(next)) => delay = next,
                    Ok(_) => break,
                    Err(e) => {
                        tracing::warn!(id = %id, error = %e, "sync retry aborted");
                        break;
                    }
                }
            }
            lock(&queue.scheduled).remove(&id);
        });
    }

    fn is_scheduled(&self, id: &str) -> bool {
        lock(&self.scheduled).contains(id)
    }

    /// One replay attempt for the item currently queued under `id`.
    async fn attempt(&self, id: &str) -> Result<Attempt, Error> {
        let Some(item) = self.lock_items().iter().find(|item| item.id == id).cloned() else {
            return Ok(Attempt::Skipped);
        };
        let Some(_in_flight) = InFlight::acquire(&self.in_flight, id) else {
            return Ok(Attempt::Skipped);
        };

        let outcome = match Request::from_sync_item(&item) {
            Ok(request) => match self.fetcher.fetch(&request).await {
                Ok(response) if response.ok() => Ok(()),
                Ok(response) => Err(Error::HttpError(format!("{} {}", response.status, item.url)).to_string()),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(()) => {
                self.forget(id).await?;
                tracing::info!(id = %id, url = %item.url, "background sync succeeded");
                self.emit(WorkerMessage::SyncSuccess { url: item.url, id: item.id });
                Ok(Attempt::Succeeded)
            }
            Err(error) => {
                let retry_count = item.retry_count + 1;
                let attempted = SyncQueueItem { retry_count, ..item };
                if attempted.is_exhausted() {
                    if !self.forget(id).await? {
                        return Ok(Attempt::Skipped);
                    }
                    tracing::warn!(id = %id, url = %attempted.url, retries = retry_count, error = %error, "background sync gave up");
                    self.emit(WorkerMessage::SyncFailed { url: attempted.url, id: attempted.id, error: Some(error) });
                    return Ok(Attempt::Failed);
                }

                if !self.db.update_sync_retry_count(id, retry_count).await? {
                    return Ok(Attempt::Skipped);
                }
                let updated = {
                    let mut items = self.lock_items();
                    items.iter_mut().find(|queued| queued.id == id).map(|queued| {
                        queued.retry_count = retry_count;
                        queued.clone()
                    })
                };
                self.publish();

                tracing::debug!(id = %id, retries = retry_count, error = %error, "background sync attempt failed");
                match updated {
                    Some(item) => {
                        self.emit(WorkerMessage::UpdateSyncItem { item });
                        Ok(Attempt::Retry(self.policy.retry_delay(retry_count)))
                    }
                    None => Ok(Attempt::Skipped),
                }
            }
        }
    }

    /// Remove from storage, then memory, then publish.
    async fn forget(&self, id: &str) -> Result<bool, Error> {
        let removed = self.db.remove_sync_item(id).await?;
        let mut items = self.lock_items();
        let before = items.len();
        items.retain(|item| item.id != id);
        let changed = removed || items.len() != before;
        drop(items);
        if changed {
            self.publish();
        }
        Ok(changed)
    }

    fn publish(&self) {
        let snapshot = self.items();
        self.snapshots.send_replace(snapshot);
    }

    fn emit(&self, message: WorkerMessage) {
        // no receivers is fine
        let _ = self.events.send(message);
    }

    fn next_id(&self, url: &str, timestamp: i64) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(timestamp.to_be_bytes());
        hasher.update(n.to_be_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{timestamp}-{}", &digest[..12])
    }

    fn lock_items(&self) -> MutexGuard<'_, Vec<SyncQueueItem>> {
        lock(&self.items)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let inserted = lock(set).insert(id.to_string());
        inserted.then(|| Self { set, id: id.to_string() })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.id);
    }
}
