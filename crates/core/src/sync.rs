//! Durable persistence for the background sync queue.
//!
//! The queue table is the source of truth; the engine keeps an in-memory
//! mirror that is only ever written through these operations.

use crate::Error;
use crate::cache::CacheDb;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_rusqlite::params;

/// A failed mutating request waiting to be replayed.
///
/// Invariant: `retry_count <= max_retries`. The item leaves the queue when a
/// replay succeeds or `retry_count` reaches `max_retries`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: String,
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Milliseconds since the Unix epoch when the item was queued.
    pub timestamp: i64,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl SyncQueueItem {
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

impl CacheDb {
    /// Load every queued item in arrival order.
    pub async fn load_sync_items(&self) -> Result<Vec<SyncQueueItem>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<SyncQueueItem>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, url, method, headers_json, body, timestamp, retry_count, max_retries
                     FROM sync_queue ORDER BY seq ASC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, i64>(7)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(id, url, method, headers_json, body, timestamp, retry_count, max_retries)| -> Result<SyncQueueItem, Error> {
                        Ok(SyncQueueItem {
                            id,
                            url,
                            method,
                            headers: serde_json::from_str(&headers_json)?,
                            body,
                            timestamp,
                            retry_count: retry_count.max(0) as u32,
                            max_retries: max_retries.max(0) as u32,
                        })
                    })
                    .collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Append an item to the end of the queue.
    pub async fn insert_sync_item(&self, item: &SyncQueueItem) -> Result<(), Error> {
        let headers_json = serde_json::to_string(&item.headers)?;
        let item = item.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO sync_queue (id, url, method, headers_json, body, timestamp, retry_count, max_retries)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        item.id,
                        item.url,
                        item.method,
                        headers_json,
                        item.body,
                        item.timestamp,
                        item.retry_count as i64,
                        item.max_retries as i64,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Record a new retry count. Returns false if the item is no longer queued.
    pub async fn update_sync_retry_count(&self, id: &str, retry_count: u32) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let updated = conn.execute(
                    "UPDATE sync_queue SET retry_count = ?2 WHERE id = ?1",
                    params![id, retry_count as i64],
                )?;
                Ok(updated > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove an item. Returns false if it was already gone.
    pub async fn remove_sync_item(&self, id: &str) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM sync_queue WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_item(id: &str) -> SyncQueueItem {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        SyncQueueItem {
            id: id.to_string(),
            url: "https://example.com/api/workouts".to_string(),
            method: "POST".to_string(),
            headers,
            body: Some(r#"{"reps":10}"#.to_string()),
            timestamp: 1_700_000_000_000,
            retry_count: 0,
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_in_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.insert_sync_item(&make_item("b")).await.unwrap();
        db.insert_sync_item(&make_item("a")).await.unwrap();

        let items = db.load_sync_items().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "b");
        assert_eq!(items[1], make_item("a"));
    }

    #[tokio::test]
    async fn test_update_retry_count() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.insert_sync_item(&make_item("x")).await.unwrap();

        assert!(db.update_sync_retry_count("x", 2).await.unwrap());
        assert!(!db.update_sync_retry_count("missing", 1).await.unwrap());

        let items = db.load_sync_items().await.unwrap();
        assert_eq!(items[0].retry_count, 2);
    }

    #[tokio::test]
    async fn test_remove_item() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.insert_sync_item(&make_item("x")).await.unwrap();

        assert!(db.remove_sync_item("x").await.unwrap());
        assert!(!db.remove_sync_item("x").await.unwrap());
        assert!(db.load_sync_items().await.unwrap().is_empty());
    }

    #[test]
    fn test_item_serde_shape() {
        let json = serde_json::to_value(make_item("x")).unwrap();
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["maxRetries"], 3);
        assert_eq!(json["headers"]["content-type"], "application/json");
    }

    #[test]
    fn test_is_exhausted() {
        let mut item = make_item("x");
        assert!(!item.is_exhausted());
        item.retry_count = 3;
        assert!(item.is_exhausted());
    }
}
