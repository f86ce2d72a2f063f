//! Caching protocols.
//!
//! Every protocol tries one source, falls back to another, and either yields a
//! response or propagates a failure for the dispatcher to turn into an offline
//! fallback. A network error and a non-2xx response both count as a failed
//! network attempt; only a network error on a mutating request is queued for
//! background sync.
//!
//! Cache I/O errors never escape a protocol: they are logged and the protocol
//! carries on as if the store were empty.

mod cache_first;
mod image;
mod network_first;
mod stale_while_revalidate;

use std::sync::Arc;

use reqwest::Method;
use swcache_core::config::CacheLimits;
use swcache_core::{AppConfig, CacheDb, CacheNames, Error, ResourceClass, StoredResponse};

use crate::expiry::ExpiryPolicy;
use crate::fetch::Fetcher;
use crate::request::{Request, Response};
use crate::sync_queue::SyncQueue;

pub use cache_first::cache_first;
pub use image::{IMAGE_ACCEPT, image};
pub use network_first::network_first;
pub use stale_while_revalidate::stale_while_revalidate;

/// Which protocol serves a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    Image,
}

impl Protocol {
    pub fn for_class(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Static | ResourceClass::Runtime => Protocol::CacheFirst,
            ResourceClass::Image => Protocol::Image,
            ResourceClass::Api => Protocol::NetworkFirst,
            ResourceClass::Page => Protocol::StaleWhileRevalidate,
        }
    }
}

/// Everything a protocol needs: stores, network, expiry and the sync queue.
pub struct CacheContext {
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    names: CacheNames,
    limits: CacheLimits,
    expiry: ExpiryPolicy,
    image_max_bytes: u64,
    sync_queue: Arc<SyncQueue>,
}

impl CacheContext {
    pub fn new(config: &AppConfig, db: CacheDb, fetcher: Arc<dyn Fetcher>, sync_queue: Arc<SyncQueue>) -> Self {
        Self {
            db,
            fetcher,
            names: config.cache_names(),
            limits: config.limits.clone(),
            expiry: ExpiryPolicy::from_config(config),
            image_max_bytes: config.image_max_bytes,
            sync_queue,
        }
    }

    /// Run the protocol that serves `class`.
    pub async fn run(self: &Arc<Self>, class: ResourceClass, request: &Request) -> Result<Response, Error> {
        match Protocol::for_class(class) {
            Protocol::CacheFirst => cache_first(self, class, request).await,
            Protocol::NetworkFirst => network_first(self, class, request).await,
            Protocol::StaleWhileRevalidate => stale_while_revalidate(self, class, request).await,
            Protocol::Image => image(self, request).await,
        }
    }

    pub async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.fetcher.fetch(request).await
    }

    pub fn is_expired(&self, class: ResourceClass, stored: &StoredResponse) -> bool {
        self.expiry.is_expired(class, stored)
    }

    /// Cached entry for a request, expired or not.
    pub async fn lookup(&self, class: ResourceClass, request: &Request) -> Option<StoredResponse> {
        let name = self.names.name_for(class);
        let result = match self.db.open_store(&name).await {
            Ok(store) => store.get(request.method.as_str(), request.url.as_str()).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(store = %name, url = %request.url, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store a response and trim the class's store to its ceiling.
    ///
    /// Only GET responses are stored.
    pub async fn store(&self, class: ResourceClass, request: &Request, response: &Response) {
        if request.method != Method::GET {
            return;
        }

        let name = self.names.name_for(class);
        let stored = response.to_stored(request);
        let result = async {
            let store = self.db.open_store(&name).await?;
            store.put(&stored).await?;
            store.enforce_limit(self.limits.for_class(class)).await
        }
        .await;

        match result {
            Ok(evicted) if evicted > 0 => {
                tracing::debug!(store = %name, evicted, "evicted oldest entries");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(store = %name, url = %request.url, error = %e, "cache write failed"),
        }
    }

    /// Queue a mutating request whose network attempt failed.
    pub async fn enqueue(&self, request: &Request) {
        if let Err(e) = self.sync_queue.add(request).await {
            tracing::warn!(url = %request.url, error = %e, "failed to queue request for background sync");
        }
    }

    pub fn image_max_bytes(&self) -> u64 {
        self.image_max_bytes
    }
}
