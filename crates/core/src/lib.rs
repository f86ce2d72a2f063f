//! Core types and shared functionality for swcache.
//!
//! This crate provides:
//! - Cache storage with SQLite backend
//! - Durable background sync queue persistence
//! - The engine <-> page message protocol
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod messages;
pub mod sync;

pub use cache::{CacheDb, CacheNames, CacheStore, ResourceClass, StoreStats, StoredResponse};
pub use config::AppConfig;
pub use error::Error;
pub use messages::{PageMessage, PlatformEvent, SerializedRequest, WorkerMessage};
pub use sync::SyncQueueItem;
