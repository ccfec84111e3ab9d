//! Offline cache manager and its lifecycle host.
//!
//! The manager mirrors the service worker lifecycle: install pre-caches a
//! fixed manifest into the current generation's bucket, activate deletes
//! stale generations, and every intercepted fetch follows a network-first
//! policy with cache fallback and an opportunistic background refresh.

mod host;
mod manager;

pub use host::{WorkerHost, WorkerState};
pub use manager::{OfflineWorker, Worker};
