//! Network access seam for the interceptor.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::time::Duration;
use url::{Origin, Url};

use super::request::Request;
use super::response::{Response, ResponseKind};

/// Something that can put a request on the wire.
///
/// An `Err` means the request never produced a response (offline, DNS,
/// connection reset). HTTP error statuses are ordinary responses.
pub trait Network: Send + Sync {
  fn issue<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>>;
}

/// Network backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestNetwork {
  client: reqwest::Client,
  origin: Origin,
}

impl ReqwestNetwork {
  /// Create a client for an app served from `base_url`.
  pub fn new(base_url: &Url, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin: base_url.origin(),
    })
  }

  async fn send(&self, request: &Request) -> Result<Response> {
    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

    let url = response.url().clone();
    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", url, e))?
      .to_vec();

    let kind = if url.origin() == self.origin {
      ResponseKind::Basic
    } else {
      ResponseKind::Cors
    };

    Ok(Response {
      headers,
      ..Response::new(url, status, body).with_kind(kind)
    })
  }
}

impl Network for ReqwestNetwork {
  fn issue<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
    Box::pin(self.send(request))
  }
}
