//! The two caching strategies and the routing between them.

use color_eyre::Result;
use tracing::{debug, warn};

use super::interceptor::{FetchOutcome, Interceptor};
use crate::cache::CacheResult;
use crate::http::{Request, Response};

/// Which strategy answers a GET request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Images: large, rarely changing, instant display matters most
  CacheFirst,
  /// Everything else: freshness matters most
  NetworkFirst,
}

impl Strategy {
  pub fn for_request(request: &Request) -> Self {
    if request.is_image() {
      Self::CacheFirst
    } else {
      Self::NetworkFirst
    }
  }
}

impl Interceptor {
  /// Serve from the store if possible, otherwise fetch and cache.
  /// Error and partial responses are passed on uncached.
  ///
  /// A network failure on a miss is returned as an error; no placeholder
  /// image is substituted.
  pub(super) async fn cache_first(&self, request: &Request) -> Result<CacheResult<Response>> {
    if let Some(hit) = self.storage.get(self.version(), request)? {
      debug!(url = %request.url, "Cache hit");
      return Ok(CacheResult::from_cache(hit.response, hit.cached_at));
    }

    let response = self.network.issue(request).await?;
    if !response.is_cacheable() {
      return Ok(CacheResult::from_network(response));
    }

    self.cache_in_background(request, &response);
    Ok(CacheResult::from_network(response))
  }

  /// Fetch from the network, falling back to the store and then to the
  /// app shell for navigations.
  pub(super) async fn network_first(&self, request: &Request) -> Result<FetchOutcome> {
    let error = match self.network.issue(request).await {
      Ok(response) => {
        if request.is_http() && !response.is_partial() {
          self.cache_in_background(request, &response);
        }
        return Ok(FetchOutcome::Resolved(CacheResult::from_network(response)));
      }
      Err(e) => e,
    };

    warn!(url = %request.url, "Fetch failed; returning offline cache: {}", error);

    if let Some(hit) = self.storage.get(self.version(), request)? {
      return Ok(FetchOutcome::Resolved(CacheResult::offline(
        hit.response,
        hit.cached_at,
      )));
    }

    if request.is_navigation() {
      let shell = Request::get(self.config.shell.clone());
      if let Some(hit) = self.storage.get(self.version(), &shell)? {
        debug!(url = %request.url, shell = %shell.url, "Serving app shell");
        return Ok(FetchOutcome::Resolved(CacheResult::app_shell(
          hit.response,
          hit.cached_at,
        )));
      }
    }

    Ok(FetchOutcome::Unresolved)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Destination;
  use url::Url;

  #[test]
  fn test_routing() {
    let base = Url::parse("http://localhost/").unwrap();
    let route = |path: &str| Strategy::for_request(&Request::get(base.join(path).unwrap()));

    assert_eq!(route("./photo.jpg"), Strategy::CacheFirst);
    assert_eq!(route("./img/banner.PNG"), Strategy::CacheFirst);
    assert_eq!(route("./index.html"), Strategy::NetworkFirst);
    assert_eq!(route("./api/records"), Strategy::NetworkFirst);
    assert_eq!(route("./app.js"), Strategy::NetworkFirst);
  }

  #[test]
  fn test_routing_by_destination() {
    let url = Url::parse("http://localhost/avatar?id=7").unwrap();
    let request = Request::get(url).with_destination(Destination::Image);
    assert_eq!(Strategy::for_request(&request), Strategy::CacheFirst);
  }
}
