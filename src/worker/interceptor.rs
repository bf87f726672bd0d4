//! The offline cache interceptor: install, activate and fetch handlers.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::lifecycle::{Lifecycle, WorkerState};
use super::strategy::Strategy;
use crate::cache::{CacheResult, CacheStorage};
use crate::http::{Network, Request, Response};

/// Settings for one deployed version of the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
  /// Name of the current store; changing it invalidates every older store
  pub version: String,
  /// Fetched into the store on install, in order
  pub assets: Vec<Url>,
  /// Root document served to offline navigations that were never cached
  pub shell: Url,
}

/// What the interceptor decided for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// Not ours; the caller should issue the request itself
  Passthrough,
  /// A response, and where it came from
  Resolved(CacheResult<Response>),
  /// Offline with nothing cached; surfaces as a failed load
  Unresolved,
}

/// Routes requests between the network and the current versioned store.
///
/// Cache writes triggered by fetches are best-effort: they run in the
/// background, the caller never waits for them, and a failed write is
/// only logged. Use [`Interceptor::flush`] to wait for them, e.g. before exit.
pub struct Interceptor {
  pub(super) config: WorkerConfig,
  pub(super) storage: Arc<dyn CacheStorage>,
  pub(super) network: Arc<dyn Network>,
  lifecycle: Mutex<Lifecycle>,
  pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl Interceptor {
  pub fn new(
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
  ) -> Self {
    Self {
      config,
      storage,
      network,
      lifecycle: Mutex::new(Lifecycle::default()),
      pending_writes: Mutex::new(Vec::new()),
    }
  }

  /// Name of the current store.
  pub fn version(&self) -> &str {
    &self.config.version
  }

  pub fn state(&self) -> Result<WorkerState> {
    Ok(self.lifecycle()?.state())
  }

  pub fn skip_waiting(&self) -> Result<bool> {
    Ok(self.lifecycle()?.skip_waiting())
  }

  pub fn clients_claimed(&self) -> Result<bool> {
    Ok(self.lifecycle()?.clients_claimed())
  }

  /// Pick up this version if an earlier run completed its install.
  ///
  /// Returns the resulting state. A store that only holds fetch writes does
  /// not count; such a version stays `Parsed`.
  pub fn resume(&self) -> Result<WorkerState> {
    let mut lifecycle = self.lifecycle()?;
    if lifecycle.state() == WorkerState::Parsed && self.storage.is_installed(self.version())? {
      lifecycle.resume_installed()?;
    }
    Ok(lifecycle.state())
  }

  /// Install handler: pre-populate the current store with the asset manifest.
  ///
  /// All assets are fetched before anything is written. If any of them fails
  /// or answers with a non-2xx or partial (206) status, nothing is committed.
  /// A store created by this call is removed again and this version becomes
  /// redundant.
  pub async fn install(&self) -> Result<usize> {
    {
      let mut lifecycle = self.lifecycle()?;
      lifecycle.begin_install()?;
      lifecycle.request_skip_waiting();
    }
    info!(version = %self.version(), "Install");

    match self.precache().await {
      Ok(count) => {
        self.lifecycle()?.finish_install()?;
        info!(version = %self.version(), count, "Caching app shell complete");
        Ok(count)
      }
      Err(e) => {
        self.lifecycle()?.fail_install()?;
        Err(e)
      }
    }
  }

  async fn precache(&self) -> Result<usize> {
    let created = self.storage.open(self.version())?;

    let result = self.fetch_assets().await.and_then(|entries| {
      self.storage.commit_install(self.version(), &entries)?;
      Ok(entries.len())
    });

    if let Err(e) = &result {
      warn!(version = %self.version(), "Install failed: {}", e);
      if created {
        if let Err(e) = self.storage.delete(self.version()) {
          warn!(version = %self.version(), "Failed to remove partial store: {}", e);
        }
      }
    }

    result
  }

  /// Fetch the whole manifest concurrently; the first failure wins.
  async fn fetch_assets(&self) -> Result<Vec<(Request, Response)>> {
    try_join_all(self.config.assets.iter().map(|url| self.fetch_asset(url))).await
  }

  async fn fetch_asset(&self, url: &Url) -> Result<(Request, Response)> {
    let request = Request::get(url.clone());
    let response = self.network.issue(&request).await?;
    if !response.ok() || response.is_partial() {
      return Err(eyre!(
        "Asset {} answered with status {}",
        request.url,
        response.status
      ));
    }
    Ok((request, response))
  }

  /// Activate handler: delete every store that is not the current version,
  /// then take control of all open clients.
  ///
  /// Returns the names of the deleted stores. Deletion cannot be undone.
  pub async fn activate(&self) -> Result<Vec<String>> {
    self.lifecycle()?.begin_activate()?;
    info!(version = %self.version(), "Activate");

    match self.evict_stale_stores() {
      Ok(deleted) => {
        let mut lifecycle = self.lifecycle()?;
        lifecycle.claim_clients();
        lifecycle.finish_activate()?;
        Ok(deleted)
      }
      Err(e) => {
        self.lifecycle()?.fail_activate()?;
        Err(e)
      }
    }
  }

  fn evict_stale_stores(&self) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for name in self.storage.names()? {
      if name != self.version() {
        info!(store = %name, "Removing old cache");
        self.storage.delete(&name)?;
        deleted.push(name);
      }
    }
    Ok(deleted)
  }

  /// Fetch handler: route one request.
  ///
  /// Non-GET requests are left alone. Images are served cache-first,
  /// everything else network-first.
  pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome> {
    if !request.is_get() {
      debug!(method = %request.method, url = %request.url, "Passing through");
      return Ok(FetchOutcome::Passthrough);
    }

    match Strategy::for_request(request) {
      Strategy::CacheFirst => self
        .cache_first(request)
        .await
        .map(FetchOutcome::Resolved),
      Strategy::NetworkFirst => self.network_first(request).await,
    }
  }

  /// Write a copy of `response` to the current store without waiting for it.
  pub(super) fn cache_in_background(&self, request: &Request, response: &Response) {
    let storage = Arc::clone(&self.storage);
    let version = self.config.version.clone();
    let request = request.clone();
    let response = response.clone();

    let handle = tokio::task::spawn_blocking(move || {
      if let Err(e) = storage.put(&version, &request, &response) {
        warn!(url = %request.url, "Failed to cache response: {}", e);
      }
    });

    let mut pending = self
      .pending_writes
      .lock()
      .unwrap_or_else(|e| e.into_inner());
    pending.retain(|h| !h.is_finished());
    pending.push(handle);
  }

  /// Wait for every background cache write started so far.
  pub async fn flush(&self) {
    let handles = std::mem::take(
      &mut *self
        .pending_writes
        .lock()
        .unwrap_or_else(|e| e.into_inner()),
    );

    for handle in handles {
      if let Err(e) = handle.await {
        warn!("Cache write task failed: {}", e);
      }
    }
  }

  fn lifecycle(&self) -> Result<MutexGuard<'_, Lifecycle>> {
    self
      .lifecycle
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}
