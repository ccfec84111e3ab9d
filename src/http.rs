//! Request/response model shared by the fetcher and the cache store.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// An outbound request from a controlled page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  /// Root-relative path, e.g. "/icon-192.png"
  pub path: String,
}

impl Request {
  /// Create a GET request for a root-relative path.
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: "GET".to_string(),
      path: path.into(),
    }
  }

  /// Cache key for this request.
  ///
  /// SHA256 hash of method + path for stable, fixed-length keys.
  pub fn cache_key(&self) -> String {
    let input = format!("{} {}", self.method.to_uppercase(), self.path);
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A captured HTTP response.
///
/// Cloneable so the fetch handler can store a copy while returning the
/// original to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  /// Whether this response may be written to the cache.
  ///
  /// Only exact 200s qualify; other 2xx statuses and redirects pass through
  /// uncached, as do error statuses.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200
  }

  /// The synthesized fallback returned when the network is down and the
  /// cache has no entry for the request.
  pub fn offline() -> Self {
    let mut headers = BTreeMap::new();
    headers.insert(
      "Content-Type".to_string(),
      "text/plain; charset=utf-8".to_string(),
    );
    Self {
      status: 503,
      status_text: "Service Unavailable".to_string(),
      headers,
      body: b"You appear to be offline.".to_vec(),
    }
  }

  /// Look up a header value by name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}
