//! SQLite-backed cache store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CacheStore, EntryInfo};
use crate::http::{Request, Response};

/// Durable cache store keeping every generation in one database file.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open the store at an explicit path, creating parent directories.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open an in-memory store. Used by tests.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("taktcache").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per cache generation
CREATE TABLE IF NOT EXISTS buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Captured responses keyed by request identity
CREATE TABLE IF NOT EXISTS entries (
    bucket TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    request_path TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, entry_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_key ON entries(entry_key);
"#;

/// Write one entry within an already-locked connection.
fn insert_entry(
  conn: &Connection,
  bucket: &str,
  request: &Request,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries (bucket, entry_key, request_path, status, status_text, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        bucket,
        request.cache_key(),
        request.path,
        response.status,
        response.status_text,
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store entry for {}: {}", request.path, e))?;

  Ok(())
}

fn ensure_bucket(conn: &Connection, bucket: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO buckets (name) VALUES (?)",
      params![bucket],
    )
    .map_err(|e| eyre!("Failed to create bucket {}: {}", bucket, e))?;
  Ok(())
}

fn row_to_response(
  status: u16,
  status_text: String,
  headers: String,
  body: Vec<u8>,
) -> Result<Response> {
  let headers: BTreeMap<String, String> =
    serde_json::from_str(&headers).map_err(|e| eyre!("Failed to parse cached headers: {}", e))?;

  Ok(Response {
    status,
    status_text,
    headers,
    body,
  })
}

impl CacheStore for SqliteStore {
  fn open(&self, bucket: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    ensure_bucket(&conn, bucket)
  }

  fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    ensure_bucket(&conn, bucket)?;
    insert_entry(&conn, bucket, request, response)
  }

  fn put_many(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // One transaction for the whole batch; dropping it without commit rolls
    // everything back, so a failed batch leaves no partial entries.
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_bucket(&tx, bucket)?;
    for (request, response) in entries {
      insert_entry(&tx, bucket, request, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit batch: {}", e))?;

    Ok(())
  }

  fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<Response>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, String, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, status_text, headers, body FROM entries
         WHERE bucket = ? AND entry_key = ?",
        params![bucket, request.cache_key()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query entry: {}", e))?;

    match row {
      Some((status, status_text, headers, body)) => {
        Ok(Some(row_to_response(status, status_text, headers, body)?))
      }
      None => Ok(None),
    }
  }

  fn match_any(&self, request: &Request, preferred: &str) -> Result<Option<Response>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // The preferred bucket sorts first, the rest follow in name order
    let row: Option<(u16, String, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, status_text, headers, body FROM entries
         WHERE entry_key = ?
         ORDER BY bucket = ? DESC, bucket
         LIMIT 1",
        params![request.cache_key(), preferred],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query entry: {}", e))?;

    match row {
      Some((status, status_text, headers, body)) => {
        Ok(Some(row_to_response(status, status_text, headers, body)?))
      }
      None => Ok(None),
    }
  }

  fn delete(&self, bucket: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE bucket = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete entries for {}: {}", bucket, e))?;
    let deleted = tx
      .execute("DELETE FROM buckets WHERE name = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", bucket, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit delete: {}", e))?;

    Ok(deleted > 0)
  }

  fn list_buckets(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM buckets ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let buckets = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .collect::<std::result::Result<Vec<String>, _>>()
      .map_err(|e| eyre!("Failed to read bucket row: {}", e))?;

    Ok(buckets)
  }

  fn entries(&self, bucket: &str) -> Result<Vec<EntryInfo>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT request_path, status, cached_at FROM entries
         WHERE bucket = ? ORDER BY request_path",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![bucket], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, u16>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list entries: {}", e))?
      .collect::<std::result::Result<Vec<_>, _>>()
      .map_err(|e| eyre!("Failed to read entry row: {}", e))?;

    rows
      .into_iter()
      .map(|(path, status, cached_at)| {
        Ok(EntryInfo {
          path,
          status,
          cached_at: parse_datetime(&cached_at)?,
        })
      })
      .collect()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
