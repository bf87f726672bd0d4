//! Core types shared by the storage backends and the interceptor.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::http::{Request, Response};

/// Stable, fixed-length cache key for a request.
///
/// Only the request identity (method + absolute URL) participates, so the
/// same resource requested as an image or as a navigation shares one entry.
pub fn cache_key(request: &Request) -> String {
  let mut hasher = Sha256::new();
  hasher.update(request.identity().as_bytes());
  hex::encode(hasher.finalize())
}

/// A response snapshot read back from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub response: Response,
  /// When the snapshot was written
  pub cached_at: DateTime<Utc>,
}

/// Listing row for a cached entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
  pub url: String,
  pub status: u16,
  pub cached_at: DateTime<Utc>,
}

/// Result of an intercepted fetch, including metadata about the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh data from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Cached data served without touching the network.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Cached data served because the network failed.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// App shell served in place of a navigation that failed and was never cached.
  pub fn app_shell(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::AppShell,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Cache hit, network never consulted
  Cache,
  /// Offline mode - network unavailable, serving cached data
  Offline,
  /// Offline navigation answered with the app shell
  AppShell,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Offline => "offline",
      Self::AppShell => "app-shell",
    };
    f.write_str(name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  #[test]
  fn test_cache_key_is_stable_hex() {
    let url = Url::parse("http://localhost/index.html").unwrap();
    let a = cache_key(&Request::get(url.clone()));
    let b = cache_key(&Request::navigate(url));
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn test_cache_key_differs_by_url() {
    let a = cache_key(&Request::get(Url::parse("http://localhost/a.js").unwrap()));
    let b = cache_key(&Request::get(Url::parse("http://localhost/b.js").unwrap()));
    assert_ne!(a, b);
  }
}
