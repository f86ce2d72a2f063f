use std::sync::Arc;

use swcache_core::{Error, ResourceClass};

use super::CacheContext;
use crate::request::{Request, Response};

/// Serve a fresh cached entry without touching the network.
///
/// On a miss or an expired entry the network is tried; a successful response
/// is stored. If the network attempt fails, any cached entry is served, even
/// an expired one.
pub async fn cache_first(ctx: &Arc<CacheContext>, class: ResourceClass, request: &Request) -> Result<Response, Error> {
    cache_first_admitting(ctx, class, request, |_| true).await
}

/// Cache-first with a predicate deciding which network responses are stored.
pub(super) async fn cache_first_admitting(
    ctx: &CacheContext, class: ResourceClass, request: &Request, admit: impl Fn(&Response) -> bool,
) -> Result<Response, Error> {
    let cached = ctx.lookup(class, request).await;

    if let Some(stored) = &cached
        && !ctx.is_expired(class, stored)
    {
        tracing::debug!(class = %class, url = %request.url, "cache hit");
        return Ok(Response::from(stored.clone()));
    }

    match ctx.fetch(request).await {
        Ok(response) if response.ok() => {
            if admit(&response) {
                ctx.store(class, request, &response).await;
            }
            Ok(response)
        }
        outcome => match cached {
            Some(stored) => {
                tracing::debug!(class = %class, url = %request.url, "network failed, serving stale entry");
                Ok(Response::from(stored))
            }
            None => outcome,
        },
    }
}
