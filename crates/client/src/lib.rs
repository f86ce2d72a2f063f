//! The swcache offline engine.
//!
//! This crate intercepts outgoing requests and serves them through a
//! per-class caching protocol, falling back to synthesized offline responses
//! when neither cache nor network can answer. It also owns the install and
//! activation lifecycle and the background sync queue for failed mutations.

pub mod classify;
pub mod dispatch;
pub mod engine;
pub mod expiry;
pub mod fallback;
pub mod fetch;
pub mod lifecycle;
pub mod request;
pub mod state;
pub mod strategy;
pub mod sync_queue;

#[cfg(test)]
mod testing;

pub use classify::{BypassReason, Classifier};
pub use dispatch::{Dispatched, Disposition};
pub use engine::{CacheStats, FetchOutcome, OfflineEngine};
pub use expiry::ExpiryPolicy;
pub use fetch::{FetchConfig, Fetcher, HttpFetcher};
pub use lifecycle::{ActivationReport, MaintenanceReport};
pub use request::{Destination, Request, RequestMode, Response};
pub use reqwest::{Method, StatusCode, Url};
pub use state::{EngineState, WorkerPhase};
pub use sync_queue::{SyncQueue, SyncReport};
