//! Install, activation and storage maintenance.
//!
//! ### Phases
//! parsed -> installing -> installed -> activating -> activated
//!
//! A failed install leaves the engine installed but waiting; it activates
//! only on an explicit skip-waiting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use swcache_core::cache::meta::ACTIVE_VERSION;
use swcache_core::config::CacheLimits;
use swcache_core::messages::BACKGROUND_SYNC_TAG;
use swcache_core::{AppConfig, CacheDb, CacheNames, Error, ResourceClass, WorkerMessage};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};

use crate::fetch::{Fetcher, resolve};
use crate::request::Request;
use crate::state::{EngineState, WorkerPhase};

/// What one activation did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct ActivationReport {
    pub deleted_stores: Vec<String>,
    pub evicted_entries: u64,
    pub maintenance: MaintenanceReport,
}

/// What one maintenance check did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct MaintenanceReport {
    /// The periodic full cleanup was due and ran.
    pub cleanup_ran: bool,
    /// Storage usage was over the ceiling and ceilings were shrunk.
    pub aggressive_trim: bool,
}

/// Per-class ceilings under storage pressure.
///
/// Page and image stores keep 70%, api and runtime stores 50%, the static
/// store is untouched. No ceiling drops below one entry.
pub fn aggressive_limits(limits: &CacheLimits) -> CacheLimits {
    let scale = |entries: usize, factor: f64| ((entries as f64 * factor).floor() as usize).max(1);
    CacheLimits {
        static_entries: limits.static_entries,
        image_entries: scale(limits.image_entries, 0.7),
        api_entries: scale(limits.api_entries, 0.5),
        runtime_entries: scale(limits.runtime_entries, 0.5),
        page_entries: scale(limits.page_entries, 0.7),
    }
}

/// Owns the engine's lifecycle transitions.
pub struct Lifecycle {
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    config: Arc<AppConfig>,
    names: CacheNames,
    state: Arc<EngineState>,
    events: broadcast::Sender<WorkerMessage>,
}

impl Lifecycle {
    pub fn new(
        db: CacheDb, fetcher: Arc<dyn Fetcher>, config: Arc<AppConfig>, state: Arc<EngineState>,
        events: broadcast::Sender<WorkerMessage>,
    ) -> Self {
        let names = config.cache_names();
        Self { db, fetcher, config, names, state, events }
    }

    /// `{version}-{build_id}` identifying this engine build.
    pub fn version_tag(&self) -> String {
        format!("{}-{}", self.config.cache_version, self.config.build_id)
    }

    /// Pre-cache the critical asset manifest.
    ///
    /// All assets are fetched before any is stored; one failure stores
    /// nothing. On success a different recorded active version means an
    /// update is waiting, and `SW_UPDATE_AVAILABLE` is broadcast.
    pub async fn install(&self) -> Result<(), Error> {
        self.state.set_phase(WorkerPhase::Installing);
        let result = self.precache().await;
        self.state.set_phase(WorkerPhase::Installed);
        let count = result?;

        tracing::info!(assets = count, store = %self.names.name_for(ResourceClass::Static), "installed");

        let active = self.db.get_meta(ACTIVE_VERSION).await?;
        if active.is_some_and(|active| active != self.version_tag()) {
            tracing::info!(version = %self.version_tag(), "update available");
            let _ = self.events.send(WorkerMessage::SwUpdateAvailable);
        }
        Ok(())
    }

    async fn precache(&self) -> Result<usize, Error> {
        let origin =
            url::Url::parse(&self.config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.config.origin)))?;

        let mut requests = Vec::with_capacity(self.config.static_assets.len());
        for asset in &self.config.static_assets {
            let url = resolve(&origin, asset).map_err(|e| Error::InstallFailed(format!("{asset}: {e}")))?;
            requests.push(Request::get(url));
        }

        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            tasks.spawn(async move {
                let outcome = fetcher.fetch(&request).await;
                (index, request, outcome)
            });
        }

        let mut fetched = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let (index, request, outcome) = joined.map_err(|e| Error::InstallFailed(e.to_string()))?;
            let response = match outcome {
                Ok(response) if response.ok() => response,
                Ok(response) => {
                    return Err(Error::InstallFailed(format!("{}: HTTP {}", request.url, response.status.as_u16())));
                }
                Err(e) => return Err(Error::InstallFailed(format!("{}: {e}", request.url))),
            };
            fetched.push((index, response.to_stored(&request)));
        }
        fetched.sort_by_key(|(index, _)| *index);

        let store = self.db.open_store(&self.names.name_for(ResourceClass::Static)).await?;
        for (_, stored) in &fetched {
            store.put(stored).await?;
        }
        Ok(fetched.len())
    }

    /// Activate when installed and waiting; otherwise a no-op.
    pub async fn skip_waiting(&self) -> Option<ActivationReport> {
        if !self.state.transition(WorkerPhase::Installed, WorkerPhase::Activating) {
            tracing::debug!(phase = ?self.state.phase(), "skip waiting ignored");
            return None;
        }
        Some(self.activate().await)
    }

    /// Take control: drop old stores, trim current ones, claim clients.
    ///
    /// Storage failures are logged; activation itself always completes.
    pub async fn activate(&self) -> ActivationReport {
        self.state.set_phase(WorkerPhase::Activating);

        let (deleted, evicted, ()) =
            tokio::join!(self.delete_stale_stores(), self.enforce_limits(&self.config.limits), self.claim_clients());

        let deleted_stores = deleted.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to delete stale stores");
            Vec::new()
        });
        let evicted_entries = evicted.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to enforce store ceilings");
            0
        });

        if let Err(e) = self.db.set_meta(ACTIVE_VERSION, &self.version_tag()).await {
            tracing::warn!(error = %e, "failed to record active version");
        }
        self.state.register_sync(BACKGROUND_SYNC_TAG);
        self.state.set_phase(WorkerPhase::Activated);
        tracing::info!(version = %self.version_tag(), deleted = deleted_stores.len(), evicted_entries, "activated");

        let maintenance = self.run_maintenance().await;
        ActivationReport { deleted_stores, evicted_entries, maintenance }
    }

    /// Delete every store not owned by the current version.
    pub async fn delete_stale_stores(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.db.store_names().await? {
            if self.names.is_current(&name) {
                continue;
            }
            if self.db.delete_store(&name).await? {
                tracing::info!(store = %name, "deleted stale store");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Trim every existing current store to its ceiling.
    pub async fn enforce_limits(&self, limits: &CacheLimits) -> Result<u64, Error> {
        let mut evicted = 0;
        for class in ResourceClass::ALL {
            let name = self.names.name_for(class);
            if !self.db.has_store(&name).await? {
                continue;
            }
            let store = self.db.open_store(&name).await?;
            evicted += store.enforce_limit(limits.for_class(class)).await?;
        }
        Ok(evicted)
    }

    async fn claim_clients(&self) {
        self.state.claim_clients();
    }

    /// Periodic cleanup check and storage pressure check, concurrently.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let (cleanup_ran, aggressive_trim) = tokio::join!(self.periodic_cleanup(), self.relieve_storage_pressure());
        MaintenanceReport { cleanup_ran, aggressive_trim }
    }

    async fn periodic_cleanup(&self) -> bool {
        let interval = chrono::Duration::from_std(self.config.cleanup_interval()).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();

        let last = match self.db.last_cleanup().await {
            Ok(last) => last,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read last cleanup time");
                return false;
            }
        };

        if let Some(last) = last {
            let elapsed = now - last;
            if elapsed < interval {
                let remaining = (interval - elapsed).num_minutes();
                tracing::info!(remaining_minutes = remaining, "next cleanup not due yet");
                return false;
            }
        }

        let result = async {
            let deleted = self.delete_stale_stores().await?;
            let evicted = self.enforce_limits(&self.config.limits).await?;
            self.db.set_last_cleanup(now).await?;
            Ok::<_, Error>((deleted.len(), evicted))
        }
        .await;

        match result {
            Ok((deleted, evicted)) => {
                tracing::info!(deleted_stores = deleted, evicted, "periodic cleanup complete");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "periodic cleanup failed");
                false
            }
        }
    }

    async fn relieve_storage_pressure(&self) -> bool {
        let usage = match self.db.estimate_usage().await {
            Ok(usage) => usage,
            Err(e) => {
                tracing::debug!(error = %e, "storage estimate unavailable, skipping pressure check");
                return false;
            }
        };

        if usage <= self.config.storage_ceiling_bytes {
            return false;
        }

        tracing::warn!(usage, ceiling = self.config.storage_ceiling_bytes, "storage over ceiling, trimming aggressively");
        match self.enforce_limits(&aggressive_limits(&self.config.limits)).await {
            Ok(evicted) => {
                tracing::info!(evicted, "aggressive trim complete");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "aggressive trim failed");
                false
            }
        }
    }

    /// Delete every store, whatever its version.
    pub async fn clear_all_caches(&self) -> Result<u64, Error> {
        let deleted = self.db.delete_all_stores().await?;
        tracing::info!(deleted, "cleared all caches");
        Ok(deleted)
    }

    /// Re-run maintenance every `period`, skipping the immediate first tick.
    pub fn spawn_periodic(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = self.run_maintenance().await;
                tracing::debug!(?report, "maintenance tick");
            }
        })
    }
}
