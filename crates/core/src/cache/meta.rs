//! Engine metadata that outlives a single engine process.

use super::connection::CacheDb;
use crate::Error;
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Key for the timestamp of the last full cleanup.
pub const LAST_CLEANUP: &str = "last_cleanup";

/// Key for the cache version that last completed activation.
pub const ACTIVE_VERSION: &str = "active_version";

impl CacheDb {
    /// Read a metadata value.
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT value FROM engine_meta WHERE key = ?1", params![key], |row| {
                    row.get(0)
                });
                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or overwrite a metadata value.
    pub async fn set_meta(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO engine_meta (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// When the last full cleanup ran, if ever.
    pub async fn last_cleanup(&self) -> Result<Option<DateTime<Utc>>, Error> {
        let raw = self.get_meta(LAST_CLEANUP).await?;
        Ok(raw
            .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
            .map(|date| date.with_timezone(&Utc)))
    }

    pub async fn set_last_cleanup(&self, at: DateTime<Utc>) -> Result<(), Error> {
        self.set_meta(LAST_CLEANUP, &at.to_rfc3339()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_meta_roundtrip_and_overwrite() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get_meta(ACTIVE_VERSION).await.unwrap().is_none());

        db.set_meta(ACTIVE_VERSION, "v1.0.0").await.unwrap();
        db.set_meta(ACTIVE_VERSION, "v1.1.0").await.unwrap();
        assert_eq!(db.get_meta(ACTIVE_VERSION).await.unwrap().as_deref(), Some("v1.1.0"));
    }

    #[tokio::test]
    async fn test_last_cleanup() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.last_cleanup().await.unwrap().is_none());

        let now = Utc::now();
        db.set_last_cleanup(now).await.unwrap();
        let stored = db.last_cleanup().await.unwrap().unwrap();
        assert_eq!(stored.timestamp(), now.timestamp());
    }
}
