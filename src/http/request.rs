use clap::ValueEnum;
use reqwest::Method;
use url::Url;

/// Image file extensions routed to the cache-first strategy.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// What kind of resource the caller intends to use the response as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Destination {
  /// No declared destination (fetch/XHR)
  #[default]
  Empty,
  Document,
  Image,
  Script,
  Style,
  Font,
}

/// Request mode, mirroring how the request was initiated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
  /// Top-level page load
  Navigate,
  SameOrigin,
  NoCors,
  #[default]
  Cors,
}

/// An outgoing request seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
  pub mode: Mode,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      destination: Destination::default(),
      mode: Mode::default(),
    }
  }

  /// A plain GET request.
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// A top-level navigation to a document.
  pub fn navigate(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      destination: Destination::Document,
      mode: Mode::Navigate,
    }
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn with_mode(mut self, mode: Mode) -> Self {
    self.mode = mode;
    self
  }

  /// Only GET requests are ever cached or answered from cache.
  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == Mode::Navigate
  }

  /// Whether the request targets an image, either by declared destination
  /// or by the file extension of the URL path.
  pub fn is_image(&self) -> bool {
    if self.destination == Destination::Image {
      return true;
    }

    let path = self.url.path();
    match path.rsplit_once('.') {
      Some((_, ext)) => IMAGE_EXTENSIONS
        .iter()
        .any(|candidate| ext.eq_ignore_ascii_case(candidate)),
      None => false,
    }
  }

  /// Browser-internal schemes (chrome-extension:, data:, ...) are never cached.
  pub fn is_http(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }

  /// URL as stored in cache; fragments never reach the server, so they
  /// never split entries.
  pub fn cache_url(&self) -> Url {
    let mut url = self.url.clone();
    url.set_fragment(None);
    url
  }

  /// Identity used for the cache key.
  pub fn identity(&self) -> String {
    format!("{} {}", self.method, self.cache_url())
  }
}
