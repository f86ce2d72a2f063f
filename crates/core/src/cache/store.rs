//! Named cache stores of request -> response entries.
//!
//! A store behaves like a platform cache: entries are keyed by method and
//! URL, `keys` reports insertion order, and `enforce_limit` evicts the oldest
//! inserted entries first. Reads never refresh an entry's position, so this is
//! insertion-order eviction rather than true LRU.

use super::connection::CacheDb;
use super::hash::compute_request_key;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Columns read back into a [`StoredResponse`], in `row_to_stored` order.
const ENTRY_COLUMNS: &str = "url, method, status, headers_json, body, stored_at";

fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredResponse> {
    let headers_json: String = row.get(3)?;
    let headers = serde_json::from_str(&headers_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(StoredResponse {
        url: row.get(0)?,
        method: row.get(1)?,
        status: row.get::<_, i64>(2)? as u16,
        headers,
        body: row.get(4)?,
        stored_at: row.get(5)?,
    })
}

/// A captured network response as held in a store.
///
/// Freshness is not stored; callers derive it from the `Date` header at
/// read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl StoredResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The parsed `Date` header, if present and well-formed.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        let raw = self.header("date")?;
        DateTime::parse_from_rfc2822(raw.trim())
            .ok()
            .map(|date| date.with_timezone(&Utc))
    }

    fn key(&self) -> String {
        compute_request_key(&self.method, &self.url)
    }
}

/// Entry count and approximate size of one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoreStats {
    pub name: String,
    pub entries: u64,
    pub bytes: u64,
}

/// Handle to one named store.
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: CacheDb,
    name: String,
}

impl CacheDb {
    /// Open a store, creating it if it does not exist yet.
    pub async fn open_store(&self, name: &str) -> Result<CacheStore, Error> {
        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_store(conn, &owned)?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheStore { db: self.clone(), name: name.to_string() })
    }

    /// Whether a store with this name exists.
    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every existing store, in creation order.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_stores ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and all of its entries.
    ///
    /// Returns false if the store did not exist.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                conn.execute("DELETE FROM cache_entries WHERE store = ?1", params![name])?;
                let deleted = conn.execute("DELETE FROM cache_stores WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every store.
    ///
    /// Returns the number of stores removed.
    pub async fn delete_all_stores(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                conn.execute("DELETE FROM cache_entries", [])?;
                let deleted = conn.execute("DELETE FROM cache_stores", [])?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Approximate bytes used by all stored entries.
    pub async fn estimate_usage(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let bytes: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(LENGTH(body) + LENGTH(headers_json) + LENGTH(url)), 0) FROM cache_entries",
                    [],
                    |row| row.get(0),
                )?;
                Ok(bytes.max(0) as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Find an entry for a request in any store, newest first.
    pub async fn match_any(&self, method: &str, url: &str) -> Result<Option<StoredResponse>, Error> {
        let key = compute_request_key(method, url);
        self.conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let result = conn.query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM cache_entries WHERE key_hash = ?1 ORDER BY seq DESC LIMIT 1"),
                    params![key],
                    row_to_stored,
                );

                match result {
                    Ok(stored) => Ok(Some(stored)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Entry counts and sizes per store.
    pub async fn store_stats(&self) -> Result<Vec<StoreStats>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<StoreStats>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT s.name,
                            COUNT(e.seq),
                            COALESCE(SUM(LENGTH(e.body) + LENGTH(e.headers_json) + LENGTH(e.url)), 0)
                     FROM cache_stores s
                     LEFT JOIN cache_entries e ON e.store = s.name
                     GROUP BY s.name
                     ORDER BY s.created_at ASC, s.name ASC",
                )?;
                let stats = stmt
                    .query_map([], |row| {
                        Ok(StoreStats {
                            name: row.get(0)?,
                            entries: row.get::<_, i64>(1)?.max(0) as u64,
                            bytes: row.get::<_, i64>(2)?.max(0) as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(stats)
            })
            .await
            .map_err(Error::from)
    }
}

impl CacheStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the entry for a request.
    pub async fn get(&self, method: &str, url: &str) -> Result<Option<StoredResponse>, Error> {
        let store = self.name.clone();
        let key = compute_request_key(method, url);
        self.db
            .conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let mut stmt =
                    conn.prepare(&format!("SELECT {ENTRY_COLUMNS} FROM cache_entries WHERE store = ?1 AND key_hash = ?2"))?;

                match stmt.query_row(params![store, key], row_to_stored) {
                    Ok(stored) => Ok(Some(stored)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Store a response, replacing any entry with the same key.
    ///
    /// A replaced entry moves to the newest insertion position.
    pub async fn put(&self, response: &StoredResponse) -> Result<(), Error> {
        let store = self.name.clone();
        let key = response.key();
        let headers_json = serde_json::to_string(&response.headers)?;
        let response = response.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_store(&tx, &store)?;
                tx.execute(
                    "DELETE FROM cache_entries WHERE store = ?1 AND key_hash = ?2",
                    params![store, key],
                )?;
                tx.execute(
                    "INSERT INTO cache_entries (store, key_hash, url, method, status, headers_json, body, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        store,
                        key,
                        response.url,
                        response.method,
                        response.status as i64,
                        headers_json,
                        response.body,
                        response.stored_at,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the entry for a request. Returns false if there was none.
    pub async fn delete(&self, method: &str, url: &str) -> Result<bool, Error> {
        let store = self.name.clone();
        let key = compute_request_key(method, url);
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE store = ?1 AND key_hash = ?2",
                    params![store, key],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Request URLs in insertion order, oldest first.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM cache_entries WHERE store = ?1 ORDER BY seq ASC")?;
                let keys = stmt
                    .query_map(params![store], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in the store.
    pub async fn len(&self) -> Result<usize, Error> {
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE store = ?1", params![store], |row| {
                        row.get(0)
                    })?;
                Ok(count.max(0) as usize)
            })
            .await
            .map_err(Error::from)
    }

    /// Evict the oldest inserted entries until at most `max_entries` remain.
    ///
    /// Returns the number of deleted entries.
    pub async fn enforce_limit(&self, max_entries: usize) -> Result<u64, Error> {
        let store = self.name.clone();
        let max = max_entries as i64;
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE store = ?1", params![store], |row| {
                        row.get(0)
                    })?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE seq IN (
                        SELECT seq FROM cache_entries WHERE store = ?1 ORDER BY seq ASC LIMIT ?2
                    )",
                    params![store, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

fn ensure_store(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO cache_stores (name, created_at) VALUES (?1, ?2)",
        params![name, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
