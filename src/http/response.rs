use url::Url;

/// How much of a response the caller is allowed to see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseKind {
  /// Same-origin response
  #[default]
  Basic,
  /// Cross-origin response with readable body
  Cors,
  /// Cross-origin response whose status and body cannot be inspected
  Opaque,
  /// Network error marker
  Error,
}

impl ResponseKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
      Self::Error => "error",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(Self::Basic),
      "cors" => Some(Self::Cors),
      "opaque" => Some(Self::Opaque),
      "error" => Some(Self::Error),
      _ => None,
    }
  }
}

/// A response as delivered to the caller, and the snapshot stored in cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub url: Url,
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl Response {
  pub fn new(url: Url, status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      url,
      status,
      status_text: status_text(status).to_string(),
      headers: Vec::new(),
      body: body.into(),
      kind: ResponseKind::Basic,
    }
  }

  #[cfg(test)]
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_kind(mut self, kind: ResponseKind) -> Self {
    self.kind = kind;
    self
  }

  /// Status in the 200-299 range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// 206 Partial Content; a partial body is never a valid snapshot.
  pub fn is_partial(&self) -> bool {
    self.status == 206
  }

  /// Whether this response may be written to a store.
  pub fn is_cacheable(&self) -> bool {
    !self.is_error() && !self.is_partial()
  }

  pub fn is_error(&self) -> bool {
    self.kind == ResponseKind::Error
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

fn status_text(status: u16) -> &'static str {
  reqwest::StatusCode::from_u16(status)
    .ok()
    .and_then(|code| code.canonical_reason())
    .unwrap_or("")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url() -> Url {
    Url::parse("http://localhost/index.html").unwrap()
  }

  #[test]
  fn test_ok_range() {
    assert!(Response::new(url(), 200, "").ok());
    assert!(Response::new(url(), 204, "").ok());
    assert!(!Response::new(url(), 304, "").ok());
    assert!(!Response::new(url(), 404, "").ok());
  }

  #[test]
  fn test_status_text() {
    assert_eq!(Response::new(url(), 200, "").status_text, "OK");
    assert_eq!(Response::new(url(), 404, "").status_text, "Not Found");
  }

  #[test]
  fn test_header_lookup_ignores_case() {
    let response = Response::new(url(), 200, "").with_header("Content-Type", "text/html");
    assert_eq!(response.header("content-type"), Some("text/html"));
    assert_eq!(response.header("etag"), None);
  }

  #[test]
  fn test_kind_names() {
    for kind in [
      ResponseKind::Basic,
      ResponseKind::Cors,
      ResponseKind::Opaque,
      ResponseKind::Error,
    ] {
      assert_eq!(ResponseKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(ResponseKind::parse("unknown"), None);
  }

  #[test]
  fn test_partial_not_cacheable() {
    let partial = Response::new(url(), 206, "part");
    assert!(partial.ok());
    assert!(partial.is_partial());
    assert!(!partial.is_cacheable());
    assert!(Response::new(url(), 200, "").is_cacheable());
    assert!(Response::new(url(), 404, "").is_cacheable());
    assert!(!Response::new(url(), 0, "")
      .with_kind(ResponseKind::Error)
      .is_cacheable());
  }

  #[test]
  fn test_error_kind() {
    let response = Response::new(url(), 0, "").with_kind(ResponseKind::Error);
    assert!(response.is_error());
    assert!(!response.ok());
  }
}
