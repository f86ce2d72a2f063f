//! cache_stats tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::Serialize;
use swcache_client::{CacheStats, OfflineEngine, WorkerPhase};

use super::json_result;

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CacheStatsOutput {
    pub phase: WorkerPhase,
    pub online: bool,
    pub dev_mode: bool,
    #[serde(flatten)]
    pub stats: CacheStats,
}

/// Implementation of the cache_stats tool.
pub async fn cache_stats_impl(engine: &OfflineEngine) -> Result<CallToolResult, McpError> {
    let stats = engine.cache_stats().await?;
    let state = engine.state();
    let output = CacheStatsOutput { phase: engine.phase(), online: state.is_online(), dev_mode: state.dev_mode(), stats };
    json_result(&output)
}
