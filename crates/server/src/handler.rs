//! MCP server handler implementation.
//!
//! Exposes one running engine to a host: fetches, page messages, platform
//! events and the worker's outgoing notifications.
use std::sync::Arc;

use crate::tools::messages::OUTBOX_CAPACITY;
use crate::tools::{
    ConnectivityParams, FetchParams, Outbox, PostMessageParams, SyncParams, SyncRemoveParams, cache_stats_impl,
    connectivity_impl, fetch_impl, post_message_impl, sync_impl, sync_queue_impl, sync_remove_impl,
    worker_messages_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use swcache_client::OfflineEngine;

/// The MCP server handler for swcache.
#[derive(Clone)]
pub struct SwCacheServer {
    engine: Arc<OfflineEngine>,
    outbox: Arc<Outbox>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SwCacheServer {
    /// Create a handler over a running engine.
    ///
    /// Starts forwarding the engine's broadcasts into the outbox, so this
    /// must be called inside a tokio runtime.
    pub fn new(engine: Arc<OfflineEngine>) -> Self {
        let (outbox, _forwarder) = Outbox::spawn(engine.subscribe(), OUTBOX_CAPACITY);
        Self { engine, outbox, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Issue a request through the offline engine. Returns status, headers, body and how the engine served it."
    )]
    async fn fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.engine, params.0).await
    }

    #[tool(
        description = "Send a page message (SKIP_WAITING, ENABLE_DEV_MODE, DISABLE_DEV_MODE, CLEAR_ALL_CACHES). Returns direct replies."
    )]
    async fn post_message(&self, params: Parameters<PostMessageParams>) -> Result<CallToolResult, McpError> {
        post_message_impl(&self.engine, params.0).await
    }

    /// Report a connectivity change; coming online replays the sync queue.
    #[tool(description = "Report connectivity going online or offline. Coming online replays queued requests.")]
    async fn connectivity(&self, params: Parameters<ConnectivityParams>) -> Result<CallToolResult, McpError> {
        connectivity_impl(&self.engine, params.0).await
    }

    #[tool(description = "Fire a background sync event by tag.")]
    async fn sync(&self, params: Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.engine, params.0).await
    }

    #[tool(description = "List requests waiting in the background sync queue.")]
    async fn sync_queue(&self) -> Result<CallToolResult, McpError> {
        sync_queue_impl(&self.engine).await
    }

    #[tool(description = "Drop a queued request by id without replaying it.")]
    async fn sync_remove(&self, params: Parameters<SyncRemoveParams>) -> Result<CallToolResult, McpError> {
        sync_remove_impl(&self.engine, params.0).await
    }

    #[tool(description = "Show cache stores, entry counts and estimated storage usage.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        cache_stats_impl(&self.engine).await
    }

    #[tool(description = "Drain buffered worker-to-page messages, oldest first.")]
    async fn worker_messages(&self) -> Result<CallToolResult, McpError> {
        worker_messages_impl(&self.outbox).await
    }
}

impl ServerHandler for SwCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "swcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
