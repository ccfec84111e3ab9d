//! Cache store trait: versioned buckets of captured responses.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{Request, Response};

/// Metadata about one stored entry, for status display.
#[derive(Debug, Clone)]
pub struct EntryInfo {
  /// Request path the entry was stored under
  pub path: String,
  /// Status of the captured response
  pub status: u16,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Storage backend for cache generations.
///
/// A bucket holds one generation of entries keyed by request identity.
/// Entries are never mutated in place: a put for an existing key overwrites,
/// and retiring a generation deletes its bucket wholesale. Implementations
/// serialize individual operations; callers need no further locking.
pub trait CacheStore: Send + Sync {
  /// Create the bucket if it does not already exist.
  fn open(&self, bucket: &str) -> Result<()>;

  /// Store one response, overwriting any previous entry for the same request.
  fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store a batch of responses all-or-nothing: if the batch cannot be
  /// committed in full, no entry from it is visible afterwards.
  fn put_many(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Look up a request in one bucket.
  fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<Response>>;

  /// Look up a request across every reachable bucket. The preferred bucket
  /// is consulted first; the rest follow in bucket name order.
  fn match_any(&self, request: &Request, preferred: &str) -> Result<Option<Response>>;

  /// Delete a whole bucket and its entries. Returns whether it existed.
  fn delete(&self, bucket: &str) -> Result<bool>;

  /// Names of all existing buckets, sorted.
  fn list_buckets(&self) -> Result<Vec<String>>;

  /// Entries stored in a bucket.
  fn entries(&self, bucket: &str) -> Result<Vec<EntryInfo>>;
}
