//! Fetch interception.
//!
//! ### Request pipeline
//! intercepted -> bypassed | classified -> protocol -> resolved | offline fallback
//!
//! Every intercepted request resolves to a `Response`. Protocol errors are
//! logged and replaced by the offline fallback; nothing propagates.

use std::sync::Arc;

use serde::Serialize;
use swcache_core::ResourceClass;

use crate::classify::{BypassReason, Classifier};
use crate::fallback::OfflineFallback;
use crate::request::{Request, Response};
use crate::state::EngineState;
use crate::strategy::CacheContext;

/// How an intercepted request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case", tag = "route", content = "detail")]
pub enum Disposition {
    /// Straight to the network, no caching.
    Bypassed(BypassReason),
    /// Served by the protocol for this class.
    Protocol(ResourceClass),
    /// Everything failed; a synthesized response was returned.
    OfflineFallback,
}

/// An intercepted request's response and route.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub response: Response,
    pub disposition: Disposition,
}

/// Routes intercepted requests to their protocol.
pub struct Dispatcher {
    ctx: Arc<CacheContext>,
    classifier: Classifier,
    fallback: OfflineFallback,
    state: Arc<EngineState>,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<CacheContext>, classifier: Classifier, fallback: OfflineFallback, state: Arc<EngineState>,
    ) -> Self {
        Self { ctx, classifier, fallback, state }
    }

    /// Handle a request.
    ///
    /// Returns `None` for requests the engine does not intercept (non-HTTP
    /// schemes); the caller should let them through untouched.
    pub async fn dispatch(&self, request: &Request) -> Option<Dispatched> {
        let Some(class) = self.classifier.classify(request) else {
            tracing::debug!(url = %request.url, "not intercepting non-http request");
            return None;
        };

        if let Some(reason) = self.classifier.should_bypass(request, self.state.dev_mode()) {
            tracing::debug!(url = %request.url, method = %request.method, reason = ?reason, "bypassing cache");
            return Some(self.bypass(request, reason).await);
        }

        tracing::debug!(url = %request.url, class = %class, "dispatching");
        let dispatched = match self.ctx.run(class, request).await {
            Ok(response) => Dispatched { response, disposition: Disposition::Protocol(class) },
            Err(e) => {
                tracing::warn!(url = %request.url, class = %class, error = %e, "protocol failed, using offline fallback");
                self.offline(request).await
            }
        };
        Some(dispatched)
    }

    async fn bypass(&self, request: &Request, reason: BypassReason) -> Dispatched {
        match self.ctx.fetch(request).await {
            Ok(response) => Dispatched { response, disposition: Disposition::Bypassed(reason) },
            Err(e) => {
                if reason == BypassReason::MutatingMethod && e.is_network() {
                    self.ctx.enqueue(request).await;
                }
                tracing::debug!(url = %request.url, error = %e, "bypassed request failed");
                self.offline(request).await
            }
        }
    }

    async fn offline(&self, request: &Request) -> Dispatched {
        Dispatched { response: self.fallback.respond(request).await, disposition: Disposition::OfflineFallback }
    }
}
