//! SQLite-backed cache storage for the offline engine.
//!
//! This module provides named, versioned request -> response stores using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Lazily created stores keyed by purpose and version
//! - Insertion-order eviction against a per-store entry ceiling
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod hash;
pub mod meta;
pub mod migrations;
pub mod names;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use names::{CacheNames, ResourceClass};
pub use store::{CacheStore, StoreStats, StoredResponse};
