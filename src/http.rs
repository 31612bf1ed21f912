//! Request and response types shared by the interceptor chain, the offline
//! worker and the network fetcher.
//!
//! A `Response` owns its body. Every read (`bytes`, `text`, `json`) consumes the
//! response, so a body can only ever be read once. Code that needs to both
//! store and return a body must call `duplicate()` first.

use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

/// What the request is for, mirroring the fetch `destination` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
  #[default]
  Empty,
  Document,
  Image,
  Script,
  Style,
  Manifest,
}

/// How the request interacts with HTTP caches along the way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
  #[default]
  Default,
  /// Bypass any cached copy and force revalidation with the origin
  Reload,
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
  pub cache_mode: CacheMode,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      destination: Destination::Empty,
      cache_mode: CacheMode::Default,
      headers: Vec::new(),
    }
  }

  #[cfg(test)]
  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
    self.cache_mode = cache_mode;
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Key under which a response to this request is stored.
  pub fn cache_key(&self) -> CacheKey {
    CacheKey::new(self.method.as_str(), self.url.as_str())
  }
}

/// Method + URL, the identity of a cached entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub method: String,
  pub url: String,
}

impl CacheKey {
  pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      method: method.into(),
      url: url.into(),
    }
  }
}

/// An HTTP response with a single-consumption body.
#[derive(Debug, PartialEq, Eq)]
pub struct Response {
  status: u16,
  headers: Vec<(String, String)>,
  body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  #[cfg(test)]
  pub fn ok(body: impl Into<Vec<u8>>) -> Self {
    Self::new(200, Vec::new(), body.into())
  }

  pub fn status(&self) -> u16 {
    self.status
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn content_length(&self) -> usize {
    self.body.len()
  }

  /// Copy the whole response, body included.
  ///
  /// Only possible while the response is unread, since every read takes
  /// `self` by value.
  pub fn duplicate(&self) -> Self {
    Self {
      status: self.status,
      headers: self.headers.clone(),
      body: self.body.clone(),
    }
  }

  /// Split into parts, consuming the response.
  pub fn into_parts(self) -> (u16, Vec<(String, String)>, Vec<u8>) {
    (self.status, self.headers, self.body)
  }

  pub fn bytes(self) -> Vec<u8> {
    self.body
  }

  #[cfg(test)]
  pub fn text(self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  pub fn json<T: DeserializeOwned>(self) -> serde_json::Result<T> {
    serde_json::from_slice(&self.body)
  }
}
