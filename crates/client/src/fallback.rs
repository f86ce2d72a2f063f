//! Substitute responses for requests nothing else could satisfy.

use reqwest::{Method, StatusCode, Url};
use serde_json::json;
use swcache_core::{AppConfig, CacheDb};

use crate::request::{Request, Response};

const OFFLINE_MESSAGE: &str = "You are offline. This request will be retried when connectivity returns.";

/// Builds the offline response for a request. Never fails.
#[derive(Debug, Clone)]
pub struct OfflineFallback {
    db: CacheDb,
    offline_path: String,
    offline_url: Option<Url>,
}

impl OfflineFallback {
    pub fn new(config: &AppConfig, db: CacheDb) -> Self {
        let offline_url = Url::parse(&config.origin)
            .and_then(|origin| origin.join(&config.offline_path))
            .ok();
        Self { db, offline_path: config.offline_path.clone(), offline_url }
    }

    /// - navigations get the cached offline page, or a redirect to it
    /// - `/api/` requests get a JSON 503
    /// - everything else gets a plain-text 503
    pub async fn respond(&self, request: &Request) -> Response {
        if request.is_navigation() {
            if let Some(page) = self.cached_offline_page().await {
                return page;
            }
            return Response::redirect(&self.offline_path);
        }

        if request.url.path().starts_with("/api/") {
            return Response::json(
                StatusCode::SERVICE_UNAVAILABLE,
                &json!({ "error": "Offline", "message": OFFLINE_MESSAGE }),
            );
        }

        Response::text(StatusCode::SERVICE_UNAVAILABLE, "Offline - content not available")
    }

    async fn cached_offline_page(&self) -> Option<Response> {
        let url = self.offline_url.as_ref()?;
        match self.db.match_any(Method::GET.as_str(), url.as_str()).await {
            Ok(found) => found.map(Response::from),
            Err(e) => {
                tracing::warn!(error = %e, "offline page lookup failed");
                None
            }
        }
    }
}
