//! Runtime state of one engine instance.
//!
//! Everything here lives for the engine's lifetime and resets on restart;
//! only the sync queue and the maintenance timestamps are persisted, and they
//! live in the database rather than here.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

/// Lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerPhase {
    #[default]
    Parsed,
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    Activated,
}

/// Shared engine flags, injected into every component as `Arc<EngineState>`.
#[derive(Debug)]
pub struct EngineState {
    phase: Mutex<WorkerPhase>,
    dev_mode: AtomicBool,
    online: AtomicBool,
    clients_claimed: AtomicBool,
    sync_tags: Mutex<BTreeSet<String>>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            phase: Mutex::new(WorkerPhase::Parsed),
            dev_mode: AtomicBool::new(false),
            online: AtomicBool::new(true),
            clients_claimed: AtomicBool::new(false),
            sync_tags: Mutex::new(BTreeSet::new()),
        }
    }
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_phase(&self, phase: WorkerPhase) {
        let mut current = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if *current != phase {
            tracing::info!(from = ?*current, to = ?phase, "engine phase changed");
            *current = phase;
        }
    }

    /// Move from `from` to `to`; returns false if the engine was elsewhere.
    pub fn transition(&self, from: WorkerPhase, to: WorkerPhase) -> bool {
        let mut current = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if *current != from {
            return false;
        }
        tracing::info!(from = ?from, to = ?to, "engine phase changed");
        *current = to;
        true
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode.load(Ordering::SeqCst)
    }

    pub fn set_dev_mode(&self, enabled: bool) {
        self.dev_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record connectivity; returns true when this call restored it.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        online && !was_online
    }

    pub fn claim_clients(&self) {
        self.clients_claimed.store(true, Ordering::SeqCst);
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    /// Register a background-sync tag with the platform.
    pub fn register_sync(&self, tag: &str) {
        self.sync_tags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tag.to_string());
    }

    pub fn is_sync_registered(&self, tag: &str) -> bool {
        self.sync_tags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(tag)
    }
}
