//! Lifecycle host: drives a worker through install, activate, and fetch.

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use super::manager::Worker;
use crate::http::{Request, Response};

/// Lifecycle states, in the order a generation moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Registered but not yet installing
  Parsed,
  Installing,
  /// Install settled; the worker skips the waiting phase
  Installed,
  Activating,
  /// Serving fetches for all claimed clients
  Active,
  /// Install failed; this generation will never serve fetches
  Redundant,
}

/// Owns a worker and dispatches lifecycle events to it.
///
/// Each handler is awaited before its event counts as settled: activation
/// never starts before install resolves, and a fetch is answered only once
/// the handler picks its response path.
pub struct WorkerHost<W: Worker> {
  worker: W,
  state: WorkerState,
  controls_clients: bool,
}

impl<W: Worker> WorkerHost<W> {
  pub fn new(worker: W) -> Self {
    Self {
      worker,
      state: WorkerState::Parsed,
      controls_clients: false,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  /// Whether already-open clients are routed through this worker.
  pub fn controls_clients(&self) -> bool {
    self.controls_clients
  }

  pub fn worker(&self) -> &W {
    &self.worker
  }

  /// Run install then activate for this generation.
  ///
  /// A failed install leaves the worker redundant and skips activation. The
  /// worker requests skip-waiting, so activation follows install directly
  /// instead of waiting for open clients to close. Activation claims all
  /// open clients.
  pub async fn register(&mut self) -> Result<()> {
    self.state = WorkerState::Installing;
    if let Err(e) = self.worker.on_install().await {
      self.state = WorkerState::Redundant;
      return Err(eyre!("Install failed: {}", e));
    }
    self.state = WorkerState::Installed;

    self.state = WorkerState::Activating;
    if let Err(e) = self.worker.on_activate().await {
      // Cleanup failures are recoverable and never block activation
      warn!(error = %e, "Activation cleanup failed");
    }
    self.state = WorkerState::Active;
    self.controls_clients = true;
    info!("Worker active and controlling clients");

    Ok(())
  }

  /// Adopt an already-installed generation without replaying install.
  ///
  /// Used when the controlling context restarts: durable state lives in the
  /// cache store, so the worker resumes serving fetches directly.
  pub fn adopt(&mut self) {
    self.state = WorkerState::Active;
    self.controls_clients = true;
  }

  /// Route one request through the active worker.
  pub async fn fetch(&self, request: &Request) -> Result<Response> {
    if self.state != WorkerState::Active {
      return Err(eyre!(
        "Worker is not active (state: {:?}); run install first",
        self.state
      ));
    }
    Ok(self.worker.on_fetch(request).await)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  /// Worker stub that records the order events are dispatched in.
  struct StubWorker {
    events: Mutex<Vec<&'static str>>,
    fail_install: bool,
  }

  impl StubWorker {
    fn new(fail_install: bool) -> Self {
      Self {
        events: Mutex::new(Vec::new()),
        fail_install,
      }
    }

    fn events(&self) -> Vec<&'static str> {
      self.events.lock().unwrap().clone()
    }
  }

  impl Worker for StubWorker {
    async fn on_install(&self) -> Result<()> {
      self.events.lock().unwrap().push("install");
      if self.fail_install {
        return Err(eyre!("asset unreachable"));
      }
      Ok(())
    }

    async fn on_activate(&self) -> Result<()> {
      self.events.lock().unwrap().push("activate");
      Ok(())
    }

    async fn on_fetch(&self, _request: &Request) -> Response {
      self.events.lock().unwrap().push("fetch");
      Response::offline()
    }
  }

  #[tokio::test]
  async fn test_install_precedes_activate() {
    let mut host = WorkerHost::new(StubWorker::new(false));
    host.register().await.unwrap();

    assert_eq!(host.worker().events(), vec!["install", "activate"]);
    assert_eq!(host.state(), WorkerState::Active);
    assert!(host.controls_clients());
  }

  #[tokio::test]
  async fn test_failed_install_is_redundant() {
    let mut host = WorkerHost::new(StubWorker::new(true));

    assert!(host.register().await.is_err());
    assert_eq!(host.state(), WorkerState::Redundant);
    assert!(!host.controls_clients());
    // Activation must never have fired
    assert_eq!(host.worker().events(), vec!["install"]);
  }

  #[tokio::test]
  async fn test_fetch_requires_active_worker() {
    let host = WorkerHost::new(StubWorker::new(false));
    assert!(host.fetch(&Request::get("/")).await.is_err());
  }

  #[tokio::test]
  async fn test_fetch_routes_through_worker() {
    let mut host = WorkerHost::new(StubWorker::new(false));
    host.register().await.unwrap();

    let response = host.fetch(&Request::get("/")).await.unwrap();
    assert_eq!(response.status, 503);
    assert_eq!(host.worker().events(), vec!["install", "activate", "fetch"]);
  }

  #[tokio::test]
  async fn test_adopt_skips_install() {
    let mut host = WorkerHost::new(StubWorker::new(false));
    host.adopt();

    assert_eq!(host.state(), WorkerState::Active);
    host.fetch(&Request::get("/")).await.unwrap();
    assert_eq!(host.worker().events(), vec!["fetch"]);
  }
}
