//! Cache layer that orchestrates the two fetch strategies over cache generations.

use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::generations::{Generation, Generations};
use super::traits::{CacheResult, CachedEntry, Purpose, StoredResponse};
use crate::fetch::{FetchError, Fetcher};
use crate::http::{CacheKey, Request, Response};

/// Run a storage call on the blocking pool and wait for it.
///
/// SQLite access is synchronous, so every cache read and write goes through
/// here (or `store_in_background`) instead of running on an async worker thread.
pub async fn run_blocking<T, W>(work: W) -> Result<T>
where
  T: Send + 'static,
  W: FnOnce() -> Result<T> + Send + 'static,
{
  tokio::task::spawn_blocking(work)
    .await
    .map_err(|e| eyre!("Cache task did not complete: {}", e))?
}

/// Background cache writes that have not finished yet.
#[derive(Default)]
pub struct PendingWrites {
  handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PendingWrites {
  fn push(&self, handle: JoinHandle<()>) {
    let mut handles = match self.handles.lock() {
      Ok(handles) => handles,
      Err(poisoned) => poisoned.into_inner(),
    };
    handles.retain(|h| !h.is_finished());
    handles.push(handle);
  }

  /// Wait for every write spawned so far.
  pub async fn settle(&self) {
    let handles: Vec<_> = match self.handles.lock() {
      Ok(mut handles) => handles.drain(..).collect(),
      Err(poisoned) => poisoned.into_inner().drain(..).collect(),
    };
    for handle in handles {
      if let Err(e) = handle.await {
        warn!(error = %e, "Cache write task did not complete");
      }
    }
  }
}

/// Cache layer that manages caching strategies and network fetching.
///
/// Writes never block the response path and their failures are only logged.
pub struct CacheLayer {
  generations: Generations,
  pending: PendingWrites,
}

impl CacheLayer {
  pub fn new(generations: Generations) -> Self {
    Self {
      generations,
      pending: PendingWrites::default(),
    }
  }

  pub fn generations(&self) -> &Generations {
    &self.generations
  }

  pub async fn settle(&self) {
    self.pending.settle().await
  }

  /// Serve from the generation if present, otherwise fetch and populate.
  ///
  /// A network failure on a miss is returned to the caller.
  pub async fn cache_first<F: Fetcher + ?Sized>(
    &self,
    purpose: Purpose,
    request: &Request,
    network: &F,
  ) -> Result<CacheResult<Response>, FetchError> {
    let generation = self.generations.get(purpose);
    let key = request.cache_key();

    let lookup = {
      let (generation, key) = (generation.clone(), key.clone());
      run_blocking(move || generation.get(&key)).await
    };

    match lookup {
      Ok(Some(entry)) => {
        debug!(url = %request.url, generation = generation.name(), "Serving from cache");
        return Ok(CacheResult::from_cache(
          entry.response.into_response(),
          entry.cached_at,
        ));
      }
      Ok(None) => {}
      Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed, treating as miss"),
    }

    let response = network.fetch(request).await.map_err(|e| {
      error!(url = %request.url, error = %e, "Fetch failed with nothing cached");
      e
    })?;

    if is_storable(request, &response) {
      debug!(url = %request.url, generation = generation.name(), "Caching new response");
      let copy = response.duplicate();
      self.store_in_background(generation.clone(), key, copy);
    }

    Ok(CacheResult::from_network(response))
  }

  /// Always try the network, keep a copy of good GET responses, and fall
  /// back to any cached copy and then to the shell document when offline.
  pub async fn network_first<F: Fetcher + ?Sized>(
    &self,
    purpose: Purpose,
    request: &Request,
    network: &F,
    shell: &CacheKey,
  ) -> Result<CacheResult<Response>, FetchError> {
    let network_error = match network.fetch(request).await {
      Ok(response) => {
        if is_storable(request, &response) {
          let copy = response.duplicate();
          self.store_in_background(self.generations.get(purpose).clone(), request.cache_key(), copy);
        }
        return Ok(CacheResult::from_network(response));
      }
      Err(e) => e,
    };

    warn!(url = %request.url, error = %network_error, "Fetch failed, trying cache");

    if let Some(entry) = self.lookup_any(&request.cache_key()).await {
      debug!(url = %request.url, generation = %entry.generation, "Serving cached copy");
      return Ok(CacheResult::offline(
        entry.response.into_response(),
        entry.cached_at,
      ));
    }

    if let Some(entry) = self.lookup_any(shell).await {
      debug!(
        url = %request.url,
        shell = %shell.url,
        generation = %entry.generation,
        "Serving shell document"
      );
      return Ok(CacheResult::shell(
        entry.response.into_response(),
        entry.cached_at,
      ));
    }

    Err(FetchError::Offline {
      url: request.url.to_string(),
    })
  }

  async fn lookup_any(&self, key: &CacheKey) -> Option<CachedEntry> {
    let storage = Arc::clone(self.generations.storage());
    let owned = key.clone();
    match run_blocking(move || storage.match_any(&owned)).await {
      Ok(entry) => entry,
      Err(e) => {
        warn!(url = %key.url, error = %e, "Cache lookup failed");
        None
      }
    }
  }

  /// Persist a response and wait for the write to land.
  pub async fn store(&self, generation: &Generation, key: CacheKey, response: Response) -> Result<()> {
    let generation = generation.clone();
    run_blocking(move || generation.put(&key, &StoredResponse::from_response(response))).await
  }

  /// Persist a response copy without holding up the caller.
  fn store_in_background(&self, generation: Generation, key: CacheKey, copy: Response) {
    let handle = tokio::task::spawn_blocking(move || {
      let stored = StoredResponse::from_response(copy);
      if let Err(e) = generation.put(&key, &stored) {
        warn!(
          url = %key.url,
          generation = generation.name(),
          error = %e,
          "Failed to cache response"
        );
      }
    });
    self.pending.push(handle);
  }
}

/// Only successful GET responses are kept.
fn is_storable(request: &Request, response: &Response) -> bool {
  request.method == Method::GET && response.status() == 200
}
