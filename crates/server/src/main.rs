//! swcache server entry point.
//!
//! Boots the offline engine over its SQLite store and serves it as an MCP
//! server on stdio. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use swcache_client::{FetchConfig, HttpFetcher, OfflineEngine};
use swcache_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        origin = %config.origin,
        version = %config.cache_version,
        build = %config.build_id,
        db = %config.db_path.display(),
        "starting swcache on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let fetcher = Arc::new(HttpFetcher::new(FetchConfig::from(&config))?);
    let engine = Arc::new(OfflineEngine::new(config, db, fetcher).await?);

    if let Some(report) = engine.start().await {
        tracing::info!(deleted = report.deleted_stores.len(), evicted = report.evicted_entries, "engine activated");
    }
    let _maintenance = engine.spawn_maintenance();

    let handler = handler::SwCacheServer::new(Arc::clone(&engine));
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    Ok(())
}
