use std::sync::Arc;

use swcache_core::{Error, ResourceClass};

use super::CacheContext;
use crate::request::{Request, Response};

/// Prefer the network, fall back to any cached entry.
///
/// A mutating request that fails at the network layer is queued for
/// background sync before the fallback lookup.
pub async fn network_first(
    ctx: &Arc<CacheContext>, class: ResourceClass, request: &Request,
) -> Result<Response, Error> {
    let outcome = ctx.fetch(request).await;

    match &outcome {
        Ok(response) if response.ok() => {
            ctx.store(class, request, response).await;
            return outcome;
        }
        Err(e) if e.is_network() && request.is_mutating() => {
            ctx.enqueue(request).await;
        }
        _ => {}
    }

    match ctx.lookup(class, request).await {
        Some(stored) => {
            tracing::debug!(class = %class, url = %request.url, "network failed, serving cached entry");
            Ok(Response::from(stored))
        }
        None => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::*;
    use reqwest::{Method, StatusCode};

    #[tokio::test]
    async fn test_success_updates_cache() {
        let h = harness().await;
        h.seed(ResourceClass::Api, "/api/profile", "old", 0).await;
        h.fetcher.route("/api/profile", StatusCode::OK, r#"{"ok":true}"#);

        let request = Request::get(url("/api/profile"));
        let response = network_first(&h.ctx, ResourceClass::Api, &request).await.unwrap();
        assert_eq!(response.text_body(), r#"{"ok":true}"#);
        assert_eq!(h.fetcher.calls("/api/profile"), 1);

        h.fetcher.set_offline(true);
        let cached = network_first(&h.ctx, ResourceClass::Api, &request).await.unwrap();
        assert_eq!(cached.text_body(), r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_network_failure_serves_cached_entry() {
        let h = harness().await;
        h.seed(ResourceClass::Api, "/api/profile", "cached", 24 * 3600).await;
        h.fetcher.set_offline(true);

        let response = network_first(&h.ctx, ResourceClass::Api, &Request::get(url("/api/profile")))
            .await
            .unwrap();
        assert_eq!(response.text_body(), "cached");
    }

    #[tokio::test]
    async fn test_http_error_falls_back_to_cache() {
        let h = harness().await;
        h.seed(ResourceClass::Api, "/api/profile", "cached", 0).await;
        h.fetcher.route("/api/profile", StatusCode::SERVICE_UNAVAILABLE, "down");

        let response = network_first(&h.ctx, ResourceClass::Api, &Request::get(url("/api/profile")))
            .await
            .unwrap();
        assert_eq!(response.text_body(), "cached");
    }

    #[tokio::test]
    async fn test_http_error_without_cache_returns_response() {
        let h = harness().await;
        h.fetcher.route("/api/profile", StatusCode::SERVICE_UNAVAILABLE, "down");

        let response = network_first(&h.ctx, ResourceClass::Api, &Request::get(url("/api/profile")))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_mutating_network_failure_is_queued() {
        let h = harness().await;
        h.fetcher.set_offline(true);

        let request = Request::new(Method::POST, url("/api/workouts")).with_body("{}");
        let result = network_first(&h.ctx, ResourceClass::Api, &request).await;
        assert!(matches!(result, Err(Error::Network(_))));

        let items = h.queue.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].method, "POST");
        assert_eq!(items[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_mutating_http_error_is_not_queued() {
        let h = harness().await;
        h.fetcher.route("/api/workouts", StatusCode::BAD_REQUEST, "nope");

        let request = Request::new(Method::POST, url("/api/workouts"));
        let response = network_first(&h.ctx, ResourceClass::Api, &request).await.unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(h.queue.is_empty());
    }
}
