//! post_message and worker_messages tools.
//!
//! Worker notifications are broadcast by the engine whether or not a host is
//! listening. The [`Outbox`] keeps the most recent ones until a host drains
//! them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::{OfflineEngine, WorkerPhase};
use swcache_core::{PageMessage, WorkerMessage};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::json_result;

/// Buffered worker messages kept for hosts.
pub const OUTBOX_CAPACITY: usize = 256;

/// Bounded buffer of worker -> page messages; the oldest are dropped first.
#[derive(Debug)]
pub struct Outbox {
    buffer: Mutex<VecDeque<WorkerMessage>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self { buffer: Mutex::new(VecDeque::with_capacity(capacity)), capacity, dropped: AtomicU64::new(0) }
    }

    /// Forward everything the engine broadcasts into a new outbox.
    pub fn spawn(receiver: broadcast::Receiver<WorkerMessage>, capacity: usize) -> (Arc<Self>, JoinHandle<()>) {
        let outbox = Arc::new(Self::new(capacity));
        let task = tokio::spawn(Arc::clone(&outbox).forward(receiver));
        (outbox, task)
    }

    async fn forward(self: Arc<Self>, mut receiver: broadcast::Receiver<WorkerMessage>) {
        loop {
            match receiver.recv().await {
                Ok(message) => self.push(message),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "outbox lagged behind engine events");
                    self.dropped.fetch_add(missed, Ordering::Relaxed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    pub fn push(&self, message: WorkerMessage) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        if buffer.len() == self.capacity {
            buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(message);
    }

    /// Take every buffered message, oldest first.
    pub fn drain(&self) -> Vec<WorkerMessage> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.drain(..).collect()
    }

    /// Messages lost to overflow since the last drain.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

/// Input parameters for the post_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostMessageParams {
    /// A page message, e.g. `{"type": "SKIP_WAITING"}`.
    pub message: PageMessage,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PostMessageOutput {
    /// Direct replies to the sender.
    pub replies: Vec<WorkerMessage>,
    pub phase: WorkerPhase,
    pub dev_mode: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WorkerMessagesOutput {
    pub messages: Vec<WorkerMessage>,
    /// Messages dropped because the buffer was full.
    pub dropped: u64,
}

/// Implementation of the post_message tool.
pub async fn post_message_impl(engine: &OfflineEngine, params: PostMessageParams) -> Result<CallToolResult, McpError> {
    let replies = engine.handle_message(params.message).await;
    let output = PostMessageOutput { replies, phase: engine.phase(), dev_mode: engine.state().dev_mode() };
    json_result(&output)
}

/// Implementation of the worker_messages tool.
pub async fn worker_messages_impl(outbox: &Outbox) -> Result<CallToolResult, McpError> {
    let output = WorkerMessagesOutput { messages: outbox.drain(), dropped: outbox.take_dropped() };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{engine, json_of};
    use std::time::Duration;

    #[test]
    fn test_outbox_drops_oldest() {
        let outbox = Outbox::new(2);
        outbox.push(WorkerMessage::SwUpdateAvailable);
        outbox.push(WorkerMessage::GetSyncQueue);
        outbox.push(WorkerMessage::CachesCleared);

        assert_eq!(outbox.take_dropped(), 1);
        assert_eq!(outbox.drain(), vec![WorkerMessage::GetSyncQueue, WorkerMessage::CachesCleared]);
        assert!(outbox.drain().is_empty());
    }

    #[tokio::test]
    async fn test_outbox_forwards_broadcasts() {
        let (tx, rx) = broadcast::channel(8);
        let (outbox, task) = Outbox::spawn(rx, OUTBOX_CAPACITY);

        tx.send(WorkerMessage::SwUpdateAvailable).unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

        assert_eq!(outbox.drain(), vec![WorkerMessage::SwUpdateAvailable]);
    }

    #[tokio::test]
    async fn test_clear_all_caches_replies() {
        let (engine, _) = engine().await;
        let params = PostMessageParams { message: PageMessage::ClearAllCaches };

        let output = json_of(&post_message_impl(&engine, params).await.unwrap());
        assert_eq!(output["replies"], serde_json::json!([{"type": "CACHES_CLEARED"}]));
    }

    #[tokio::test]
    async fn test_dev_mode_toggle_reported() {
        let (engine, _) = engine().await;

        let on = post_message_impl(&engine, PostMessageParams { message: PageMessage::EnableDevMode }).await.unwrap();
        assert_eq!(json_of(&on)["dev_mode"], true);

        let off = post_message_impl(&engine, PostMessageParams { message: PageMessage::DisableDevMode }).await.unwrap();
        assert_eq!(json_of(&off)["dev_mode"], false);
    }

    #[test]
    fn test_params_accept_wire_shape() {
        let params: PostMessageParams = serde_json::from_str(r#"{"message":{"type":"SKIP_WAITING"}}"#).unwrap();
        assert_eq!(params.message, PageMessage::SkipWaiting);
    }

    #[tokio::test]
    async fn test_worker_messages_drains() {
        let outbox = Outbox::new(OUTBOX_CAPACITY);
        outbox.push(WorkerMessage::RemoveSyncItem { id: "1".into() });

        let first = json_of(&worker_messages_impl(&outbox).await.unwrap());
        assert_eq!(first["messages"][0]["type"], "REMOVE_SYNC_ITEM");
        assert_eq!(first["dropped"], 0);

        let second = json_of(&worker_messages_impl(&outbox).await.unwrap());
        assert_eq!(second["messages"], serde_json::json!([]));
    }
}
