//! The offline cache manager: install, activate, and fetch interception.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::fetch::Fetcher;
use crate::http::{Request, Response};
use crate::store::CacheStore;

/// Lifecycle handlers the host awaits.
///
/// An event is settled only when the returned future resolves; the host
/// neither proceeds past install nor responds to a page before then.
pub trait Worker {
  /// Pre-populate the current generation's bucket from the manifest.
  async fn on_install(&self) -> Result<()>;

  /// Retire buckets left over from previous generations.
  async fn on_activate(&self) -> Result<()>;

  /// Produce exactly one response for an intercepted request: the live
  /// network response, a cached one, or the synthesized offline fallback.
  async fn on_fetch(&self, request: &Request) -> Response;
}

/// Network-first cache manager for one generation of static assets.
///
/// The store and fetcher are injected so tests can run against in-memory
/// fakes. Bumping `cache_name` is the only invalidation mechanism: the next
/// activation deletes every bucket under the old names.
pub struct OfflineWorker<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  cache_name: String,
  manifest: Vec<String>,
}

impl<S: CacheStore, F: Fetcher> OfflineWorker<S, F> {
  pub fn new(
    store: Arc<S>,
    fetcher: Arc<F>,
    cache_name: impl Into<String>,
    manifest: Vec<String>,
  ) -> Self {
    Self {
      store,
      fetcher,
      cache_name: cache_name.into(),
      manifest,
    }
  }

  /// Cache lookup for the fallback path: current generation first, then any
  /// other bucket still reachable. Store errors degrade to a miss; the
  /// fetch handler must always produce a response.
  fn lookup_cached(&self, request: &Request) -> Option<Response> {
    self
      .store
      .match_any(request, &self.cache_name)
      .unwrap_or_else(|e| {
        warn!(path = %request.path, error = %e, "Cache lookup failed");
        None
      })
  }
}

impl<S: CacheStore + 'static, F: Fetcher> Worker for OfflineWorker<S, F> {
  /// Fetch every manifest path and commit the batch all-or-nothing. Any
  /// unreachable asset fails the whole install; no partial manifest is
  /// committed.
  async fn on_install(&self) -> Result<()> {
    self.store.open(&self.cache_name)?;

    let entries = try_join_all(self.manifest.iter().map(|path| async move {
      let request = Request::get(path.as_str());
      let response = self
        .fetcher
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to pre-cache {}: {}", path, e))?;
      Ok::<_, color_eyre::Report>((request, response))
    }))
    .await?;

    self.store.put_many(&self.cache_name, &entries)?;
    debug!(
      cache = %self.cache_name,
      assets = entries.len(),
      "Installed cache generation"
    );

    Ok(())
  }

  /// Delete every bucket whose name differs from the current generation.
  /// Deletions are independent and best-effort; a failure is logged and
  /// does not block activation.
  async fn on_activate(&self) -> Result<()> {
    for bucket in self.store.list_buckets()? {
      if bucket == self.cache_name {
        continue;
      }
      debug!(bucket = %bucket, "Deleting stale cache generation");
      if let Err(e) = self.store.delete(&bucket) {
        warn!(bucket = %bucket, error = %e, "Failed to delete stale cache generation");
      }
    }
    Ok(())
  }

  /// Network first. A 200 refreshes the cache in the background and is
  /// returned as-is; any other status passes through uncached. Only a
  /// network-layer failure falls back to the cache, then to the synthesized
  /// offline response.
  async fn on_fetch(&self, request: &Request) -> Response {
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable() {
          // Fire-and-forget refresh: the page never waits on this write and
          // never sees its failure.
          let store = Arc::clone(&self.store);
          let cache_name = self.cache_name.clone();
          let request = request.clone();
          let copy = response.clone();
          tokio::spawn(async move {
            if let Err(e) = store.put(&cache_name, &request, &copy) {
              warn!(path = %request.path, error = %e, "Background cache write failed");
            }
          });
        }
        response
      }
      Err(e) => {
        debug!(path = %request.path, error = %e, "Network fetch failed, trying cache");
        self
          .lookup_cached(request)
          .unwrap_or_else(Response::offline)
      }
    }
  }
}
