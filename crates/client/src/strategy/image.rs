use std::sync::Arc;

use reqwest::header::{self, HeaderValue};
use swcache_core::{Error, ResourceClass};

use super::CacheContext;
use super::cache_first::cache_first_admitting;
use crate::request::{Request, Response};

/// Content negotiation hint added to outgoing image requests.
pub const IMAGE_ACCEPT: &str = "image/webp,image/avif,image/*,*/*;q=0.8";

/// Cache-first for images, refusing to store oversized responses.
pub async fn image(ctx: &Arc<CacheContext>, request: &Request) -> Result<Response, Error> {
    let request = request
        .clone()
        .with_header(header::ACCEPT, HeaderValue::from_static(IMAGE_ACCEPT));
    let max_bytes = ctx.image_max_bytes();

    cache_first_admitting(ctx, ResourceClass::Image, &request, |response| {
        let size = response.content_length();
        if size > max_bytes {
            tracing::debug!(url = %request.url, size, max_bytes, "image too large to cache");
            return false;
        }
        true
    })
    .await
}
