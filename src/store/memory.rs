//! In-memory cache store, used by tests in place of durable storage.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::traits::{CacheStore, EntryInfo};
use crate::http::{Request, Response};

struct StoredEntry {
  path: String,
  response: Response,
  cached_at: DateTime<Utc>,
}

/// Cache store backed by a plain in-process map.
#[derive(Default)]
pub struct MemoryStore {
  buckets: RwLock<BTreeMap<String, BTreeMap<String, StoredEntry>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStore for MemoryStore {
  fn open(&self, bucket: &str) -> Result<()> {
    let mut buckets = self
      .buckets
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    buckets.entry(bucket.to_string()).or_default();
    Ok(())
  }

  fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<()> {
    let mut buckets = self
      .buckets
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    buckets.entry(bucket.to_string()).or_default().insert(
      request.cache_key(),
      StoredEntry {
        path: request.path.clone(),
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn put_many(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<()> {
    // All inserts happen under one write lock, so the batch is atomic.
    let mut buckets = self
      .buckets
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let bucket = buckets.entry(bucket.to_string()).or_default();
    for (request, response) in entries {
      bucket.insert(
        request.cache_key(),
        StoredEntry {
          path: request.path.clone(),
          response: response.clone(),
          cached_at: Utc::now(),
        },
      );
    }
    Ok(())
  }

  fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<Response>> {
    let buckets = self
      .buckets
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      buckets
        .get(bucket)
        .and_then(|b| b.get(&request.cache_key()))
        .map(|entry| entry.response.clone()),
    )
  }

  fn match_any(&self, request: &Request, preferred: &str) -> Result<Option<Response>> {
    let buckets = self
      .buckets
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let key = request.cache_key();

    if let Some(entry) = buckets.get(preferred).and_then(|b| b.get(&key)) {
      return Ok(Some(entry.response.clone()));
    }
    for (name, bucket) in buckets.iter() {
      if name == preferred {
        continue;
      }
      if let Some(entry) = bucket.get(&key) {
        return Ok(Some(entry.response.clone()));
      }
    }
    Ok(None)
  }

  fn delete(&self, bucket: &str) -> Result<bool> {
    let mut buckets = self
      .buckets
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(buckets.remove(bucket).is_some())
  }

  fn list_buckets(&self) -> Result<Vec<String>> {
    let buckets = self
      .buckets
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(buckets.keys().cloned().collect())
  }

  fn entries(&self, bucket: &str) -> Result<Vec<EntryInfo>> {
    let buckets = self
      .buckets
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      buckets
        .get(bucket)
        .map(|b| {
          b.values()
            .map(|entry| EntryInfo {
              path: entry.path.clone(),
              status: entry.response.status,
              cached_at: entry.cached_at,
            })
            .collect()
        })
        .unwrap_or_default(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(status: u16, body: &str) -> Response {
    Response {
      status,
      status_text: "OK".to_string(),
      headers: Default::default(),
      body: body.as_bytes().to_vec(),
    }
  }

  #[test]
  fn test_put_and_match() {
    let store = MemoryStore::new();
    let request = Request::get("/a.png");

    assert!(store.match_request("v1", &request).unwrap().is_none());

    store.put("v1", &request, &response(200, "bytes")).unwrap();
    let hit = store.match_request("v1", &request).unwrap().unwrap();
    assert_eq!(hit.body, b"bytes");
  }

  #[test]
  fn test_put_overwrites_by_key() {
    let store = MemoryStore::new();
    let request = Request::get("/");

    store.put("v1", &request, &response(200, "old")).unwrap();
    store.put("v1", &request, &response(200, "new")).unwrap();

    let hit = store.match_request("v1", &request).unwrap().unwrap();
    assert_eq!(hit.body, b"new");
    assert_eq!(store.entries("v1").unwrap().len(), 1);
  }

  #[test]
  fn test_buckets_are_isolated() {
    let store = MemoryStore::new();
    let request = Request::get("/a.png");

    store.put("v1", &request, &response(200, "v1 bytes")).unwrap();
    assert!(store.match_request("v2", &request).unwrap().is_none());
  }

  #[test]
  fn test_match_any_searches_all_buckets() {
    let store = MemoryStore::new();
    let request = Request::get("/a.png");

    store.put("v1", &request, &response(200, "old gen")).unwrap();
    store.open("v2").unwrap();

    let hit = store.match_any(&request, "v2").unwrap().unwrap();
    assert_eq!(hit.body, b"old gen");
  }

  #[test]
  fn test_match_any_prefers_named_bucket() {
    let store = MemoryStore::new();
    let request = Request::get("/a.png");

    store.put("v1", &request, &response(200, "v1 bytes")).unwrap();
    store.put("v2", &request, &response(200, "v2 bytes")).unwrap();

    let hit = store.match_any(&request, "v2").unwrap().unwrap();
    assert_eq!(hit.body, b"v2 bytes");

    // A preferred bucket with no hit falls through to the others
    let hit = store.match_any(&request, "v9").unwrap().unwrap();
    assert_eq!(hit.body, b"v1 bytes");
  }

  #[test]
  fn test_delete_removes_whole_bucket() {
    let store = MemoryStore::new();
    let request = Request::get("/");

    store.put("v1", &request, &response(200, "bytes")).unwrap();
    assert!(store.delete("v1").unwrap());
    assert!(!store.delete("v1").unwrap());
    assert!(store.match_request("v1", &request).unwrap().is_none());
    assert!(store.list_buckets().unwrap().is_empty());
  }

  #[test]
  fn test_open_is_lazy_create() {
    let store = MemoryStore::new();
    store.open("v1").unwrap();
    store.open("v1").unwrap();
    assert_eq!(store.list_buckets().unwrap(), vec!["v1".to_string()]);
  }

  #[test]
  fn test_put_many_stores_all() {
    let store = MemoryStore::new();
    let entries = vec![
      (Request::get("/"), response(200, "index")),
      (Request::get("/a.png"), response(200, "image")),
    ];

    store.put_many("v1", &entries).unwrap();
    for (request, _) in &entries {
      assert!(store.match_request("v1", request).unwrap().is_some());
    }
  }
}
