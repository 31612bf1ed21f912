//! Network access behind a small trait so the worker can be driven by a
//! scripted fetcher in tests.

use futures::future::BoxFuture;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use thiserror::Error;

use crate::http::{CacheMode, Request, Response};

#[derive(Error, Debug)]
pub enum FetchError {
  #[error("Network error for {url}: {message}")]
  Network { url: String, message: String },

  #[error("Invalid URL: {0}")]
  InvalidUrl(String),

  #[error("Offline and no cached copy of {url}")]
  Offline { url: String },

  #[error("Unexpected status {status} for {url}")]
  Status { url: String, status: u16 },
}

impl FetchError {
  pub fn network(url: &url::Url, error: impl std::fmt::Display) -> Self {
    FetchError::Network {
      url: url.to_string(),
      message: error.to_string(),
    }
  }
}

/// Anything that can turn a request into a response over the network.
pub trait Fetcher: Send + Sync {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>>;
}

impl<T: Fetcher + ?Sized> Fetcher for std::sync::Arc<T> {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
    (**self).fetch(request)
  }
}

/// Fetcher backed by a shared reqwest client.
#[derive(Clone)]
pub struct NetworkFetcher {
  client: reqwest::Client,
}

impl NetworkFetcher {
  pub fn new() -> color_eyre::Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("mangashelf/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| color_eyre::eyre::eyre!("Failed to build HTTP client: {}", e))?;
    Ok(Self { client })
  }

  fn build(&self, request: &Request) -> reqwest::RequestBuilder {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    if request.cache_mode == CacheMode::Reload {
      builder = builder.header(CACHE_CONTROL, "no-cache").header(PRAGMA, "no-cache");
    }
    builder
  }

  async fn send(&self, request: &Request) -> Result<Response, FetchError> {
    let response = self
      .build(request)
      .send()
      .await
      .map_err(|e| FetchError::network(&request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| FetchError::network(&request.url, e))?;

    Ok(Response::new(status, headers, body.to_vec()))
  }
}

impl Fetcher for NetworkFetcher {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
    Box::pin(self.send(request))
  }
}


#[cfg(test)]
pub mod mock {
  //! Scripted fetcher that records every request it sees.

  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  use super::*;

  #[derive(Default)]
  pub struct MockFetcher {
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Request>>,
  }

  impl MockFetcher {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn route(&self, url: &str, status: u16, body: &[u8]) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), (status, body.to_vec()));
    }

    /// Remove a route so the next request for it fails like a dropped connection.
    pub fn go_offline(&self, url: &str) {
      self.routes.lock().unwrap().remove(url);
    }

    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Request> {
      self.seen.lock().unwrap().clone()
    }
  }

  impl Fetcher for MockFetcher {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.seen.lock().unwrap().push(request.clone());
      let route = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
      Box::pin(async move {
        match route {
          Some((status, body)) => Ok(Response::new(status, Vec::new(), body)),
          None => Err(FetchError::network(&request.url, "connection refused")),
        }
      })
    }
  }
}
