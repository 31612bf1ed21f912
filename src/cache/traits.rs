//! Core traits and types for the response cache.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{CacheKey, Response};

/// Which class of resources a generation holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
  /// Application shell, stylesheet, script bundle, web manifest
  Static,
  /// Everything fetched network-first (API calls, routed documents)
  Dynamic,
  /// Cover and page images, fetched cache-first
  Images,
}

impl Purpose {
  pub const ALL: [Purpose; 3] = [Purpose::Static, Purpose::Dynamic, Purpose::Images];

  /// Family segment of the generation name.
  pub fn family(self) -> &'static str {
    match self {
      Purpose::Static => "static",
      Purpose::Dynamic => "reader",
      Purpose::Images => "images",
    }
  }

  pub fn tag(self) -> &'static str {
    match self {
      Purpose::Static => "static-assets",
      Purpose::Dynamic => "dynamic-pages",
      Purpose::Images => "images",
    }
  }
}

/// A response as it sits in a generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl StoredResponse {
  /// Take ownership of a response copy that is about to be persisted.
  pub fn from_response(response: Response) -> Self {
    let (status, headers, body) = response.into_parts();
    Self {
      status,
      headers,
      body,
    }
  }

  pub fn into_response(self) -> Response {
    Response::new(self.status, self.headers, self.body)
  }
}

/// A stored response with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub generation: String,
  pub response: StoredResponse,
  pub cached_at: DateTime<Utc>,
}

/// Storage backend for named cache generations.
pub trait CacheStorage: Send + Sync {
  /// Create the generation if it does not exist yet.
  fn open_generation(&self, name: &str) -> Result<()>;

  /// Names of all generations, oldest first.
  fn generation_names(&self) -> Result<Vec<String>>;

  /// Delete a generation and its entries. Returns whether it existed.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  /// Store a response, replacing any previous entry for the same key.
  fn put(&self, generation: &str, key: &CacheKey, response: &StoredResponse) -> Result<()>;

  /// Look up an entry in one generation.
  fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<CachedEntry>>;

  /// Look up an entry in any generation, oldest generation first.
  fn match_any(&self, key: &CacheKey) -> Result<Option<CachedEntry>>;

  /// Number of entries in a generation.
  fn entry_count(&self, generation: &str) -> Result<usize>;

  /// Version of the worker that last completed activation.
  fn registered_version(&self) -> Result<Option<String>>;

  fn set_registered_version(&self, version: &str) -> Result<()>;
}

/// Result of a cache strategy, including where the data came from.
#[derive(Debug)]
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

  /// Cache hit served without touching the network.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Network failed, serving a cached copy of the same request.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// Network failed and nothing was cached, serving the shell document.
  pub fn shell(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Shell,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  Network,
  Cache,
  Offline,
  Shell,
}
