//! The offline engine facade.
//!
//! `OfflineEngine` wires storage, network, state and channels together and
//! exposes the three entry points a host drives it through: fetches, page
//! messages and platform events.

use std::sync::Arc;

use serde::Serialize;
use swcache_core::messages::BACKGROUND_SYNC_TAG;
use swcache_core::{AppConfig, CacheDb, Error, PageMessage, PlatformEvent, StoreStats, SyncQueueItem, WorkerMessage};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::classify::Classifier;
use crate::dispatch::{Dispatched, Dispatcher};
use crate::fallback::OfflineFallback;
use crate::fetch::Fetcher;
use crate::lifecycle::{ActivationReport, Lifecycle};
use crate::request::{Request, Response};
use crate::state::{EngineState, WorkerPhase};
use crate::strategy::CacheContext;
use crate::sync_queue::{SyncQueue, SyncReport};

const EVENT_CAPACITY: usize = 256;

/// Result of a fetch handed to the engine.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The engine handled it.
    Intercepted(Dispatched),
    /// Not intercepted; this is the plain network response.
    Passthrough(Response),
}

impl FetchOutcome {
    pub fn response(&self) -> &Response {
        match self {
            FetchOutcome::Intercepted(dispatched) => &dispatched.response,
            FetchOutcome::Passthrough(response) => response,
        }
    }
}

/// Storage summary.
#[derive(Debug, Clone, Serialize, schemars::JsonSchema)]
pub struct CacheStats {
    pub stores: Vec<StoreStats>,
    pub usage_bytes: u64,
    pub ceiling_bytes: u64,
}

/// One running engine instance.
pub struct OfflineEngine {
    config: Arc<AppConfig>,
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    state: Arc<EngineState>,
    dispatcher: Dispatcher,
    lifecycle: Arc<Lifecycle>,
    sync_queue: Arc<SyncQueue>,
    events: broadcast::Sender<WorkerMessage>,
}

impl OfflineEngine {
    /// Build an engine over an opened database, reloading the sync queue.
    pub async fn new(config: AppConfig, db: CacheDb, fetcher: Arc<dyn Fetcher>) -> Result<Self, Error> {
        let config = Arc::new(config);
        let state = Arc::new(EngineState::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let sync_queue =
            SyncQueue::load(db.clone(), Arc::clone(&fetcher), config.sync.clone(), events.clone()).await?;
        let ctx = Arc::new(CacheContext::new(&config, db.clone(), Arc::clone(&fetcher), Arc::clone(&sync_queue)));
        let dispatcher = Dispatcher::new(
            ctx,
            Classifier::from_config(&config),
            OfflineFallback::new(&config, db.clone()),
            Arc::clone(&state),
        );
        let lifecycle = Arc::new(Lifecycle::new(
            db.clone(),
            Arc::clone(&fetcher),
            Arc::clone(&config),
            Arc::clone(&state),
            events.clone(),
        ));

        Ok(Self { config, db, fetcher, state, dispatcher, lifecycle, sync_queue, events })
    }

    /// Install, then skip waiting and activate when install succeeded.
    ///
    /// A failed install is logged and leaves the engine waiting.
    pub async fn start(&self) -> Option<ActivationReport> {
        match self.lifecycle.install().await {
            Ok(()) => self.lifecycle.skip_waiting().await,
            Err(e) => {
                tracing::error!(error = %e, "install failed; waiting for skip-waiting");
                None
            }
        }
    }

    /// Handle an outgoing request.
    ///
    /// Intercepted requests always produce a response. Only a passthrough
    /// request can fail, with the network's own error.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, Error> {
        match self.dispatcher.dispatch(request).await {
            Some(dispatched) => Ok(FetchOutcome::Intercepted(dispatched)),
            None => self.fetcher.fetch(request).await.map(FetchOutcome::Passthrough),
        }
    }

    /// Handle a page message; returns the direct replies.
    pub async fn handle_message(&self, message: PageMessage) -> Vec<WorkerMessage> {
        tracing::debug!(?message, "page message");
        match message {
            PageMessage::SkipWaiting => {
                self.lifecycle.skip_waiting().await;
                Vec::new()
            }
            PageMessage::EnableDevMode => {
                self.state.set_dev_mode(true);
                tracing::info!("development mode enabled, caches bypassed");
                Vec::new()
            }
            PageMessage::DisableDevMode => {
                self.state.set_dev_mode(false);
                tracing::info!("development mode disabled");
                Vec::new()
            }
            PageMessage::ClearAllCaches => match self.lifecycle.clear_all_caches().await {
                Ok(_) => vec![WorkerMessage::CachesCleared],
                Err(e) => {
                    tracing::warn!(error = %e, "failed to clear caches");
                    Vec::new()
                }
            },
        }
    }

    /// React to a platform event.
    ///
    /// Returns the sync run's totals when the event drained the queue.
    pub async fn handle_event(&self, event: PlatformEvent) -> Option<SyncReport> {
        match event {
            PlatformEvent::Online => {
                self.state.set_online(true);
                tracing::info!("connectivity restored, processing sync queue");
                Some(self.sync_queue.process().await)
            }
            PlatformEvent::Offline => {
                self.state.set_online(false);
                tracing::info!("connectivity lost");
                None
            }
            PlatformEvent::Sync { tag } if tag == BACKGROUND_SYNC_TAG && self.state.is_sync_registered(&tag) => {
                let _ = self.events.send(WorkerMessage::GetSyncQueue);
                Some(self.sync_queue.process().await)
            }
            PlatformEvent::Sync { tag } => {
                tracing::debug!(tag = %tag, "ignoring unregistered sync tag");
                None
            }
        }
    }

    /// Worker -> page notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.events.subscribe()
    }

    /// Sync queue snapshots, pushed after every change.
    pub fn watch_sync_queue(&self) -> watch::Receiver<Vec<SyncQueueItem>> {
        self.sync_queue.subscribe()
    }

    pub fn sync_queue(&self) -> Vec<SyncQueueItem> {
        self.sync_queue.items()
    }

    /// Drop a queued request without replaying it.
    pub async fn remove_sync_item(&self, id: &str) -> Result<bool, Error> {
        self.sync_queue.remove(id).await
    }

    pub fn phase(&self) -> WorkerPhase {
        self.state.phase()
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn cache_stats(&self) -> Result<CacheStats, Error> {
        let stores = self.db.store_stats().await?;
        let usage_bytes = self.db.estimate_usage().await?;
        Ok(CacheStats { stores, usage_bytes, ceiling_bytes: self.config.storage_ceiling_bytes })
    }

    /// Re-run maintenance on the configured tick.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        Arc::clone(&self.lifecycle).spawn_periodic(self.config.maintenance_tick())
    }
}
