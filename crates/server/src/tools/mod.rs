//! MCP tool implementations.
//!
//! Each tool is a plain async `*_impl` function over the engine so it can be
//! exercised without a transport.

pub mod fetch;
pub mod messages;
pub mod stats;
pub mod sync;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

pub use fetch::{FetchParams, fetch_impl};
pub use messages::{Outbox, PostMessageParams, post_message_impl, worker_messages_impl};
pub use stats::cache_stats_impl;
pub use sync::{
    ConnectivityParams, SyncParams, SyncRemoveParams, connectivity_impl, sync_impl, sync_queue_impl, sync_remove_impl,
};

/// Render a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::Output(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use rmcp::model::CallToolResult;
    use swcache_client::{Fetcher, OfflineEngine, Request, Response, StatusCode};
    use swcache_core::{AppConfig, CacheDb, Error};

    /// Answers every request with `served <path>` unless switched offline.
    #[derive(Default)]
    pub struct StubFetcher {
        offline: AtomicBool,
    }

    impl StubFetcher {
        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, Error> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(Error::Network(format!("offline: {}", request.url)));
            }
            Ok(Response::text(StatusCode::OK, &format!("served {}", request.url.path())))
        }
    }

    pub async fn engine() -> (Arc<OfflineEngine>, Arc<StubFetcher>) {
        let fetcher = Arc::new(StubFetcher::default());
        let db = CacheDb::open_in_memory().await.unwrap();
        let engine = OfflineEngine::new(AppConfig::default(), db, fetcher.clone()).await.unwrap();
        (Arc::new(engine), fetcher)
    }

    /// Parse the JSON text content of a tool result.
    pub fn json_of(result: &CallToolResult) -> serde_json::Value {
        let text = result
            .content
            .first()
            .and_then(|c| c.as_text())
            .expect("tool result has text content");
        serde_json::from_str(&text.text).unwrap()
    }
}
