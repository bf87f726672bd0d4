//! Test doubles for the network and storage seams.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

use crate::cache::{CacheStorage, CachedResponse, EntrySummary};
use crate::http::{Network, Request, Response};

/// Network that answers from a fixed URL -> response table and counts calls.
///
/// Unknown URLs get a 404. An offline mock fails every request.
#[derive(Default)]
pub struct MockNetwork {
  responses: HashMap<String, Response>,
  offline: bool,
  calls: AtomicUsize,
}

impl MockNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn offline() -> Self {
    Self {
      offline: true,
      ..Self::default()
    }
  }

  pub fn with_response(self, url: Url, status: u16, body: &str) -> Self {
    self.with(Response::new(url, status, body))
  }

  pub fn with(mut self, response: Response) -> Self {
    self
      .responses
      .insert(response.url.to_string(), response);
    self
  }

  pub fn response_for(&self, url: &Url) -> Option<Response> {
    self.responses.get(url.as_str()).cloned()
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Network for MockNetwork {
  fn issue<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
    Box::pin(async move {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.offline {
        return Err(eyre!("Request to {} failed: offline", request.url));
      }
      Ok(
        self
          .response_for(&request.url)
          .unwrap_or_else(|| Response::new(request.url.clone(), 404, "")),
      )
    })
  }
}

/// Storage whose reads always miss and whose writes always fail.
pub struct ReadOnlyStorage;

impl CacheStorage for ReadOnlyStorage {
  fn open(&self, _name: &str) -> Result<bool> {
    Err(eyre!("read-only"))
  }

  fn names(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn delete(&self, _name: &str) -> Result<bool> {
    Err(eyre!("read-only"))
  }

  fn get(&self, _name: &str, _request: &Request) -> Result<Option<CachedResponse>> {
    Ok(None)
  }

  fn put(&self, _name: &str, _request: &Request, _response: &Response) -> Result<()> {
    Err(eyre!("read-only"))
  }

  fn put_all(&self, _name: &str, _entries: &[(Request, Response)]) -> Result<()> {
    Err(eyre!("read-only"))
  }

  fn commit_install(&self, _name: &str, _entries: &[(Request, Response)]) -> Result<()> {
    Err(eyre!("read-only"))
  }

  fn is_installed(&self, _name: &str) -> Result<bool> {
    Ok(false)
  }

  fn entries(&self, _name: &str) -> Result<Vec<EntrySummary>> {
    Ok(Vec::new())
  }
}
