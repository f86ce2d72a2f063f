use std::sync::Arc;

use swcache_core::{Error, ResourceClass};

use super::CacheContext;
use crate::request::{Request, Response};

/// Serve a fresh cached entry immediately and refresh it in the background.
///
/// The refresh task is spawned and never joined; its failures are logged and
/// dropped. Without a fresh entry the network is awaited, then any cached
/// entry is tried, then the request fails with `NoCachedVersion`.
pub async fn stale_while_revalidate(
    ctx: &Arc<CacheContext>, class: ResourceClass, request: &Request,
) -> Result<Response, Error> {
    let cached = ctx.lookup(class, request).await;

    if let Some(stored) = &cached
        && !ctx.is_expired(class, stored)
    {
        tracing::debug!(class = %class, url = %request.url, "serving cached entry, revalidating");
        revalidate(Arc::clone(ctx), class, request.clone());
        return Ok(Response::from(stored.clone()));
    }

    match ctx.fetch(request).await {
        Ok(response) if response.ok() => {
            ctx.store(class, request, &response).await;
            Ok(response)
        }
        outcome => match (cached, outcome) {
            (Some(stored), _) => {
                tracing::debug!(class = %class, url = %request.url, "network failed, serving expired entry");
                Ok(Response::from(stored))
            }
            (None, Ok(response)) => Ok(response),
            (None, Err(e)) => Err(Error::NoCachedVersion(format!("{}: {e}", request.url))),
        },
    }
}

fn revalidate(ctx: Arc<CacheContext>, class: ResourceClass, request: Request) {
    tokio::spawn(async move {
        match ctx.fetch(&request).await {
            Ok(response) if response.ok() => ctx.store(class, &request, &response).await,
            Ok(response) => {
                tracing::debug!(url = %request.url, status = response.status.as_u16(), "revalidation skipped")
            }
            Err(e) => tracing::debug!(url = %request.url, error = %e, "revalidation failed"),
        }
    });
}
