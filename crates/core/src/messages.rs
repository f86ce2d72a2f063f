//! Typed message protocol between the engine and the pages it controls.
//!
//! Both directions are tagged unions serialized with a `type` field, so the
//! wire shape matches `{"type": "SKIP_WAITING"}` style payloads.

use crate::sync::SyncQueueItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Background-sync tag the engine registers with the platform.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Page -> engine control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    /// Activate a waiting engine version now.
    SkipWaiting,
    /// Bypass every cache and go straight to the network.
    EnableDevMode,
    DisableDevMode,
    /// Delete every store; answered with `CACHES_CLEARED`.
    ClearAllCaches,
}

/// A request captured for replay, as carried in `ADD_TO_SYNC_QUEUE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SerializedRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Engine -> page notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// A new version is installed and ready to activate.
    SwUpdateAvailable,
    /// A failed mutating request was queued for durable retry.
    AddToSyncQueue { request: SerializedRequest },
    /// Ask hosts that keep their own queue copy to reconcile it.
    GetSyncQueue,
    RemoveSyncItem { id: String },
    UpdateSyncItem { item: SyncQueueItem },
    SyncSuccess { url: String, id: String },
    SyncFailed {
        url: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Reply to `CLEAR_ALL_CACHES`.
    CachesCleared,
}

/// Platform events the engine reacts to besides fetches and messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// Connectivity restored.
    Online,
    /// Connectivity lost.
    Offline,
    /// The platform fired a registered background-sync tag.
    Sync { tag: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_message_wire_shape() {
        let msg: PageMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(msg, PageMessage::SkipWaiting);

        let msg: PageMessage = serde_json::from_str(r#"{"type":"CLEAR_ALL_CACHES"}"#).unwrap();
        assert_eq!(msg, PageMessage::ClearAllCaches);

        let json = serde_json::to_string(&PageMessage::EnableDevMode).unwrap();
        assert_eq!(json, r#"{"type":"ENABLE_DEV_MODE"}"#);
    }

    #[test]
    fn test_unknown_page_message_rejected() {
        let result = serde_json::from_str::<PageMessage>(r#"{"type":"REBOOT"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_worker_message_wire_shape() {
        let json = serde_json::to_value(WorkerMessage::SwUpdateAvailable).unwrap();
        assert_eq!(json["type"], "SW_UPDATE_AVAILABLE");

        let json = serde_json::to_value(WorkerMessage::SyncFailed {
            url: "https://example.com/api/workouts".into(),
            id: "abc".into(),
            error: Some("status 500".into()),
        })
        .unwrap();
        assert_eq!(json["type"], "SYNC_FAILED");
        assert_eq!(json["id"], "abc");
        assert_eq!(json["error"], "status 500");

        let json = serde_json::to_value(WorkerMessage::SyncSuccess { url: "u".into(), id: "i".into() }).unwrap();
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_platform_event_shape() {
        let event: PlatformEvent = serde_json::from_str(r#"{"type":"sync","tag":"background-sync"}"#).unwrap();
        assert_eq!(event, PlatformEvent::Sync { tag: BACKGROUND_SYNC_TAG.to_string() });
    }
}
