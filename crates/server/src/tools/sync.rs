//! Connectivity and background sync tools.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::{OfflineEngine, SyncReport};
use swcache_core::messages::BACKGROUND_SYNC_TAG;
use swcache_core::{PlatformEvent, SyncQueueItem};

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectivityParams {
    /// True when connectivity was restored, false when it was lost.
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ConnectivityOutput {
    pub online: bool,
    /// Totals of the queue run triggered by coming back online.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SyncReport>,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Background sync tag to fire (default: "background-sync").
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_tag() -> String {
    BACKGROUND_SYNC_TAG.into()
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SyncOutput {
    pub tag: String,
    /// False when the tag is not registered and the event was ignored.
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SyncReport>,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SyncQueueOutput {
    pub items: Vec<SyncQueueItem>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncRemoveParams {
    /// Id of the queued request to drop.
    pub id: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SyncRemoveOutput {
    pub id: String,
    /// False when no item with that id was queued.
    pub removed: bool,
    pub pending: usize,
}

/// Implementation of the connectivity tool.
pub async fn connectivity_impl(engine: &OfflineEngine, params: ConnectivityParams) -> Result<CallToolResult, McpError> {
    let event = if params.online { PlatformEvent::Online } else { PlatformEvent::Offline };
    let report = engine.handle_event(event).await;

    let output = ConnectivityOutput { online: engine.state().is_online(), report, pending: engine.sync_queue().len() };
    json_result(&output)
}

/// Implementation of the sync tool.
pub async fn sync_impl(engine: &OfflineEngine, params: SyncParams) -> Result<CallToolResult, McpError> {
    let report = engine.handle_event(PlatformEvent::Sync { tag: params.tag.clone() }).await;

    let output =
        SyncOutput { tag: params.tag, handled: report.is_some(), report, pending: engine.sync_queue().len() };
    json_result(&output)
}

/// Implementation of the sync_queue tool.
pub async fn sync_queue_impl(engine: &OfflineEngine) -> Result<CallToolResult, McpError> {
    let items = engine.sync_queue();
    let output = SyncQueueOutput { count: items.len(), items };
    json_result(&output)
}

/// Implementation of the sync_remove tool.
pub async fn sync_remove_impl(engine: &OfflineEngine, params: SyncRemoveParams) -> Result<CallToolResult, McpError> {
    let removed = engine.remove_sync_item(&params.id).await?;
    let output = SyncRemoveOutput { id: params.id, removed, pending: engine.sync_queue().len() };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fetch::{FetchParams, fetch_impl};
    use crate::tools::test_support::{engine, json_of};
    use std::collections::BTreeMap;

    fn post(url: &str) -> FetchParams {
        FetchParams {
            url: url.into(),
            method: "POST".into(),
            headers: BTreeMap::new(),
            body: Some("{}".into()),
            mode: None,
            destination: None,
        }
    }

    #[tokio::test]
    async fn test_online_replays_queue() {
        let (engine, fetcher) = engine().await;
        fetcher.set_offline(true);
        fetch_impl(&engine, post("/api/workouts")).await.unwrap();

        let queued = json_of(&sync_queue_impl(&engine).await.unwrap());
        assert_eq!(queued["count"], 1);

        let offline = json_of(&connectivity_impl(&engine, ConnectivityParams { online: false }).await.unwrap());
        assert_eq!(offline["online"], false);
        assert!(offline.get("report").is_none());

        fetcher.set_offline(false);
        let online = json_of(&connectivity_impl(&engine, ConnectivityParams { online: true }).await.unwrap());
        assert_eq!(online["online"], true);
        assert_eq!(online["report"]["succeeded"], 1);
        assert_eq!(online["pending"], 0);
    }

    #[tokio::test]
    async fn test_unregistered_tag_ignored() {
        let (engine, _) = engine().await;
        let params = SyncParams { tag: "periodic-refresh".into() };

        let output = json_of(&sync_impl(&engine, params).await.unwrap());
        assert_eq!(output["handled"], false);
    }

    #[tokio::test]
    async fn test_registered_tag_processes_queue() {
        let (engine, fetcher) = engine().await;
        engine.start().await;
        fetcher.set_offline(true);
        fetch_impl(&engine, post("/api/workouts")).await.unwrap();
        fetcher.set_offline(false);

        let params: SyncParams = serde_json::from_str("{}").unwrap();
        let output = json_of(&sync_impl(&engine, params).await.unwrap());
        assert_eq!(output["tag"], BACKGROUND_SYNC_TAG);
        assert_eq!(output["handled"], true);
        assert_eq!(output["report"]["attempted"], 1);
        assert_eq!(output["pending"], 0);
    }

    #[tokio::test]
    async fn test_sync_remove_drops_item() {
        let (engine, fetcher) = engine().await;
        fetcher.set_offline(true);
        fetch_impl(&engine, post("/api/workouts")).await.unwrap();
        let id = engine.sync_queue()[0].id.clone();

        let output = json_of(&sync_remove_impl(&engine, SyncRemoveParams { id: id.clone() }).await.unwrap());
        assert_eq!(output["removed"], true);
        assert_eq!(output["pending"], 0);

        let again = json_of(&sync_remove_impl(&engine, SyncRemoveParams { id }).await.unwrap());
        assert_eq!(again["removed"], false);
    }
}
