//! Offline worker: installs the application shell, purges superseded cache
//! generations and answers intercepted requests from cache or network.
//!
//! Lifecycle is `Parsed → Installing → Installed → Activating → Activated`.
//! Activation follows installation immediately, and only an activated worker
//! intercepts requests.

mod message;
mod policy;
mod registration;

pub use message::{MessageReply, WorkerMessage};
pub use registration::{register, Registration};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{run_blocking, CacheLayer, CacheResult, Generations, Purpose};
use crate::fetch::{FetchError, Fetcher};
use crate::http::{CacheKey, CacheMode, Destination, Request, Response};
use crate::intercept::{Intercepted, Interceptor};
use policy::{strategy_for, Strategy};

/// Paths cached at install time, relative to the app origin.
pub const DEFAULT_STATIC_ASSETS: &[&str] = &[
  "/",
  "/index.html",
  "/static/css/main.css",
  "/static/js/main.js",
  "/manifest.json",
];

/// Document served for routed navigations when offline.
pub const SHELL_PATH: &str = "/index.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
}

/// What an install managed to cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub cached: Vec<String>,
  pub failed: Vec<String>,
}

pub struct OfflineWorker<N: Fetcher> {
  network: N,
  layer: CacheLayer,
  origin: Url,
  static_assets: Vec<String>,
  state: Mutex<WorkerState>,
  controlling: AtomicBool,
}

impl<N: Fetcher> OfflineWorker<N> {
  pub fn new(network: N, generations: Generations, origin: Url, static_assets: Vec<String>) -> Self {
    Self {
      network,
      layer: CacheLayer::new(generations),
      origin,
      static_assets,
      state: Mutex::new(WorkerState::Parsed),
      controlling: AtomicBool::new(false),
    }
  }

  pub fn version(&self) -> &str {
    self.layer.generations().version()
  }

  pub fn generations(&self) -> &Generations {
    self.layer.generations()
  }

  pub async fn state(&self) -> WorkerState {
    *self.state.lock().await
  }

  /// Whether the worker currently answers intercepted requests.
  pub fn is_controlling(&self) -> bool {
    self.controlling.load(Ordering::SeqCst)
  }

  fn shell_key(&self) -> Option<CacheKey> {
    self
      .origin
      .join(SHELL_PATH)
      .ok()
      .map(|url| CacheKey::new("GET", url.as_str()))
  }

  /// Fetch every static asset bypassing HTTP caches and store the successes.
  ///
  /// Individual failures are logged and skipped, never fatal.
  pub async fn install(&self) -> InstallReport {
    let mut state = self.state.lock().await;
    *state = WorkerState::Installing;
    info!(version = self.version(), "Installing offline worker");

    let generation = self.layer.generations().get(Purpose::Static);
    debug!(purpose = generation.purpose().tag(), generation = generation.name(), "Opening cache");
    let opening = generation.clone();
    if let Err(e) = run_blocking(move || opening.open()).await {
      warn!(generation = generation.name(), error = %e, "Failed to open static cache");
    }

    let mut report = InstallReport::default();
    for path in &self.static_assets {
      match self.fetch_static_asset(path).await {
        Ok((key, response)) => match self.layer.store(generation, key, response).await {
          Ok(()) => report.cached.push(path.clone()),
          Err(e) => {
            warn!(path = %path, error = %e, "Failed to cache static asset");
            report.failed.push(path.clone());
          }
        },
        Err(e) => {
          warn!(path = %path, error = %e, "Failed to fetch static asset");
          report.failed.push(path.clone());
        }
      }
    }

    info!(
      cached = report.cached.len(),
      failed = report.failed.len(),
      "Static assets cached"
    );
    *state = WorkerState::Installed;
    report
  }

  async fn fetch_static_asset(&self, path: &str) -> Result<(CacheKey, Response), FetchError> {
    let url = self
      .origin
      .join(path)
      .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", path, e)))?;

    let request = Request::get(url)
      .with_cache_mode(CacheMode::Reload)
      .with_destination(destination_for(path));

    let response = self.network.fetch(&request).await?;
    if response.status() != 200 {
      return Err(FetchError::Status {
        url: request.url.to_string(),
        status: response.status(),
      });
    }
    Ok((request.cache_key(), response))
  }

  /// Delete every generation that is neither the current static nor the
  /// current image generation, then take control of requests.
  pub async fn activate(&self) -> Vec<String> {
    let mut state = self.state.lock().await;
    *state = WorkerState::Activating;
    info!(version = self.version(), "Activating offline worker");

    let generations = self.layer.generations();
    let listing = Arc::clone(generations.storage());
    let names = run_blocking(move || listing.generation_names())
      .await
      .unwrap_or_else(|e| {
        warn!(error = %e, "Failed to list cache generations");
        Vec::new()
      });

    let mut deleted = Vec::new();
    for name in names.into_iter().filter(|n| !generations.is_retained(n)) {
      info!(generation = %name, "Deleting old cache");
      let storage = Arc::clone(generations.storage());
      let target = name.clone();
      match run_blocking(move || storage.delete_generation(&target)).await {
        Ok(_) => deleted.push(name),
        Err(e) => warn!(generation = %name, error = %e, "Failed to delete old cache"),
      }
    }

    *state = WorkerState::Activated;
    self.controlling.store(true, Ordering::SeqCst);
    deleted
  }

  /// Take control without reinstalling, for a version that is already active.
  pub async fn resume(&self) {
    *self.state.lock().await = WorkerState::Activated;
    self.controlling.store(true, Ordering::SeqCst);
    debug!(version = self.version(), "Offline worker already active");
  }

  /// Answer one request according to its resource class.
  pub async fn handle_fetch(&self, request: &Request) -> Result<CacheResult<Response>, FetchError> {
    match strategy_for(request) {
      Strategy::CacheFirst => {
        self
          .layer
          .cache_first(Purpose::Images, request, &self.network)
          .await
      }
      Strategy::NetworkFirst => {
        let shell = self.shell_key().unwrap_or_else(|| request.cache_key());
        self
          .layer
          .network_first(Purpose::Dynamic, request, &self.network, &shell)
          .await
      }
    }
  }

  /// Handle a posted message, acknowledging on the reply port.
  pub async fn handle_message(&self, message: WorkerMessage, reply: oneshot::Sender<MessageReply>) {
    let success = match message {
      WorkerMessage::ClearCache => {
        let images = self.layer.generations().get(Purpose::Images).clone();
        let name = images.name().to_string();
        info!(generation = %name, "Clearing image cache");
        match run_blocking(move || images.delete()).await {
          Ok(_) => true,
          Err(e) => {
            warn!(generation = %name, error = %e, "Failed to clear image cache");
            false
          }
        }
      }
    };

    if reply.send(MessageReply { success }).is_err() {
      debug!("Message sender went away before the reply");
    }
  }

  /// Post a message and wait for the acknowledgement.
  pub async fn post_message(&self, message: WorkerMessage) -> color_eyre::Result<MessageReply> {
    let (tx, rx) = oneshot::channel();
    self.handle_message(message, tx).await;
    rx.await
      .map_err(|_| color_eyre::eyre::eyre!("Worker dropped the reply port"))
  }

  /// Post a JSON-encoded message the way a page would and return the JSON
  /// reply. Messages the worker does not understand get no reply.
  pub async fn post_json(&self, raw: &str) -> color_eyre::Result<Option<String>> {
    let Some(message) = WorkerMessage::parse(raw) else {
      return Ok(None);
    };
    let reply = self.post_message(message).await?;
    Ok(Some(serde_json::to_string(&reply)?))
  }

  /// Wait for background cache writes to finish.
  pub async fn settle(&self) {
    self.layer.settle().await
  }
}

impl<N: Fetcher> Interceptor for OfflineWorker<N> {
  fn intercept<'a>(&'a self, request: Request) -> BoxFuture<'a, Intercepted> {
    Box::pin(async move {
      if !self.is_controlling() {
        return Intercepted::Next(request);
      }
      Intercepted::Respond(self.handle_fetch(&request).await.map(|result| {
        debug!(
          url = %request.url,
          source = ?result.source,
          cached_at = ?result.cached_at,
          "Request answered by worker"
        );
        result.data
      }))
    })
  }
}

fn destination_for(path: &str) -> Destination {
  if path.ends_with(".css") {
    Destination::Style
  } else if path.ends_with(".js") {
    Destination::Script
  } else if path.ends_with("manifest.json") {
    Destination::Manifest
  } else {
    Destination::Document
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::mock::BrokenStorage;
  use crate::cache::{CacheSource, CacheStorage, CachedEntry, SqliteStorage, StoredResponse};
  use crate::db::Database;
  use crate::fetch::mock::MockFetcher;
  use color_eyre::eyre::eyre;
  use reqwest::Method;
  use std::sync::Arc;

  const ORIGIN: &str = "http://app.test";

  type TestWorker = OfflineWorker<Arc<MockFetcher>>;

  fn setup(manifest: &[&str]) -> (Arc<MockFetcher>, TestWorker, Arc<dyn CacheStorage>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::new(db));
    let network = Arc::new(MockFetcher::new());
    let worker = OfflineWorker::new(
      Arc::clone(&network),
      Generations::new(Arc::clone(&storage), "v1"),
      Url::parse(ORIGIN).unwrap(),
      manifest.iter().map(|s| s.to_string()).collect(),
    );
    (network, worker, storage)
  }

  fn get(path: &str) -> Request {
    Request::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
  }

  fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
  }

  fn key(path: &str) -> CacheKey {
    CacheKey::new("GET", url(path))
  }

  #[tokio::test]
  async fn test_install_tolerates_failed_asset() {
    let (network, worker, storage) = setup(&["/", "/index.html"]);
    network.route(&url("/"), 200, b"<html>root</html>");

    let report = worker.install().await;

    assert_eq!(report.cached, vec!["/"]);
    assert_eq!(report.failed, vec!["/index.html"]);
    assert!(storage.get("manga-static-v1", &key("/")).unwrap().is_some());
    assert!(storage.get("manga-static-v1", &key("/index.html")).unwrap().is_none());
    assert_eq!(worker.state().await, WorkerState::Installed);
  }

  #[tokio::test]
  async fn test_install_bypasses_http_cache() {
    let (network, worker, _) = setup(&["/", "/static/css/main.css"]);
    network.route(&url("/"), 200, b"root");
    network.route(&url("/static/css/main.css"), 200, b"body{}");

    worker.install().await;

    let seen = network.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|r| r.cache_mode == CacheMode::Reload));
    assert_eq!(seen[1].destination, Destination::Style);
  }

  #[tokio::test]
  async fn test_install_skips_non_200_assets() {
    let (network, worker, storage) = setup(&["/", "/manifest.json"]);
    network.route(&url("/"), 200, b"root");
    network.route(&url("/manifest.json"), 404, b"missing");

    let report = worker.install().await;

    assert_eq!(report.failed, vec!["/manifest.json"]);
    assert_eq!(storage.entry_count("manga-static-v1").unwrap(), 1);
  }

  #[tokio::test]
  async fn test_activate_purges_superseded_generations() {
    let (_, worker, storage) = setup(&[]);
    for name in [
      "manga-static-v0",
      "manga-images-v0",
      "manga-reader-v1",
      "manga-static-v1",
      "manga-images-v1",
      "something-else",
    ] {
      storage.open_generation(name).unwrap();
    }

    let deleted = worker.activate().await;

    assert_eq!(
      deleted,
      vec!["manga-static-v0", "manga-images-v0", "manga-reader-v1", "something-else"]
    );
    assert_eq!(
      storage.generation_names().unwrap(),
      vec!["manga-static-v1", "manga-images-v1"]
    );
    assert!(worker.is_controlling());
    assert_eq!(worker.state().await, WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_second_image_request_is_a_cache_hit() {
    let (network, worker, _) = setup(&[]);
    network.route(&url("/covers/one.jpg"), 200, b"jpeg bytes");
    worker.activate().await;

    let first = worker.handle_fetch(&get("/covers/one.jpg")).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    worker.settle().await;

    let second = worker.handle_fetch(&get("/covers/one.jpg")).await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data.bytes(), b"jpeg bytes");
    assert_eq!(network.calls(), 1);
  }

  #[tokio::test]
  async fn test_cached_image_is_byte_identical() {
    let (network, worker, storage) = setup(&[]);
    let body: Vec<u8> = (0..=255).collect();
    network.route(&url("/pages/1.png"), 200, &body);
    worker.activate().await;

    let returned = worker
      .handle_fetch(&get("/pages/1.png"))
      .await
      .unwrap()
      .data
      .bytes();
    worker.settle().await;

    let stored = storage.get("manga-images-v1", &key("/pages/1.png")).unwrap().unwrap();
    assert_eq!(returned, stored.response.body);
    assert_eq!(returned, body);
  }

  #[tokio::test]
  async fn test_uncached_image_failure_propagates() {
    let (_, worker, _) = setup(&[]);
    worker.activate().await;

    let result = worker.handle_fetch(&get("/covers/gone.webp")).await;
    assert!(matches!(result, Err(FetchError::Network { .. })));
  }

  #[tokio::test]
  async fn test_network_first_prefers_fresh_response() {
    let (network, worker, _) = setup(&[]);
    network.route(&url("/api/manga"), 200, b"[1]");
    worker.activate().await;

    worker.handle_fetch(&get("/api/manga")).await.unwrap();
    worker.settle().await;

    network.route(&url("/api/manga"), 200, b"[1,2]");
    let second = worker.handle_fetch(&get("/api/manga")).await.unwrap();

    assert_eq!(second.source, CacheSource::Network);
    assert_eq!(second.data.bytes(), b"[1,2]");
    assert_eq!(network.calls(), 2);
  }

  #[tokio::test]
  async fn test_offline_serves_cached_copy() {
    let (network, worker, _) = setup(&[]);
    network.route(&url("/api/manga/m1"), 200, br#"{"id":"m1"}"#);
    worker.activate().await;

    worker.handle_fetch(&get("/api/manga/m1")).await.unwrap();
    worker.settle().await;
    network.go_offline(&url("/api/manga/m1"));

    let offline = worker.handle_fetch(&get("/api/manga/m1")).await.unwrap();
    assert_eq!(offline.source, CacheSource::Offline);
    assert_eq!(offline.data.text(), r#"{"id":"m1"}"#);
  }

  #[tokio::test]
  async fn test_offline_navigation_falls_back_to_shell() {
    let (network, worker, _) = setup(&["/index.html"]);
    network.route(&url("/index.html"), 200, b"<html>shell</html>");
    worker.install().await;
    worker.activate().await;

    let result = worker.handle_fetch(&get("/manga/m1/chapter/c1")).await.unwrap();
    assert_eq!(result.source, CacheSource::Shell);
    assert_eq!(result.data.text(), "<html>shell</html>");
  }

  #[tokio::test]
  async fn test_offline_without_cache_or_shell_is_an_error() {
    let (_, worker, _) = setup(&[]);
    worker.activate().await;

    let result = worker.handle_fetch(&get("/api/featured")).await;
    assert!(matches!(result, Err(FetchError::Offline { .. })));
  }

  #[tokio::test]
  async fn test_only_successful_gets_are_stored() {
    let (network, worker, storage) = setup(&[]);
    network.route(&url("/api/search"), 200, b"[]");
    network.route(&url("/api/missing"), 404, b"not found");
    worker.activate().await;

    let post = get("/api/search").with_method(Method::POST);
    worker.handle_fetch(&post).await.unwrap();
    let missing = worker.handle_fetch(&get("/api/missing")).await.unwrap();
    worker.settle().await;

    assert_eq!(missing.data.status(), 404);
    assert_eq!(storage.entry_count("manga-reader-v1").unwrap(), 0);
  }

  #[tokio::test]
  async fn test_clear_cache_only_drops_images() {
    let (network, worker, storage) = setup(&["/"]);
    network.route(&url("/"), 200, b"root");
    network.route(&url("/api/manga"), 200, b"[]");
    network.route(&url("/covers/a.png"), 200, b"png");
    worker.install().await;
    worker.activate().await;
    worker.handle_fetch(&get("/api/manga")).await.unwrap();
    worker.handle_fetch(&get("/covers/a.png")).await.unwrap();
    worker.settle().await;

    let reply = worker.post_message(WorkerMessage::ClearCache).await.unwrap();

    assert_eq!(reply, MessageReply { success: true });
    assert_eq!(
      storage.generation_names().unwrap(),
      vec!["manga-static-v1", "manga-reader-v1"]
    );
  }

  #[tokio::test]
  async fn test_json_messages() {
    let (_, worker, _) = setup(&[]);

    let reply = worker.post_json(r#"{"type":"CLEAR_CACHE"}"#).await.unwrap();
    assert_eq!(reply.as_deref(), Some(r#"{"success":true}"#));

    let ignored = worker.post_json(r#"{"type":"SKIP_WAITING"}"#).await.unwrap();
    assert_eq!(ignored, None);
  }

  #[tokio::test]
  async fn test_clear_cache_failure_is_reported() {
    let worker = OfflineWorker::new(
      Arc::new(MockFetcher::new()),
      Generations::new(Arc::new(BrokenStorage), "v1"),
      Url::parse(ORIGIN).unwrap(),
      Vec::new(),
    );

    let reply = worker.post_message(WorkerMessage::ClearCache).await.unwrap();

    assert_eq!(reply, MessageReply { success: false });
    assert_eq!(serde_json::to_string(&reply).unwrap(), r#"{"success":false}"#);
  }

  #[tokio::test]
  async fn test_inactive_worker_passes_requests_on() {
    let (_, worker, _) = setup(&[]);
    match worker.intercept(get("/api/manga")).await {
      Intercepted::Next(request) => assert_eq!(request.url.as_str(), url("/api/manga")),
      Intercepted::Respond(_) => panic!("inactive worker must not answer"),
    }
  }

  struct ReadOnlyStorage;

  impl CacheStorage for ReadOnlyStorage {
    fn open_generation(&self, _name: &str) -> color_eyre::Result<()> {
      Err(eyre!("quota exceeded"))
    }

    fn generation_names(&self) -> color_eyre::Result<Vec<String>> {
      Ok(Vec::new())
    }

    fn delete_generation(&self, _name: &str) -> color_eyre::Result<bool> {
      Ok(false)
    }

    fn put(&self, _: &str, _: &CacheKey, _: &StoredResponse) -> color_eyre::Result<()> {
      Err(eyre!("quota exceeded"))
    }

    fn get(&self, _: &str, _: &CacheKey) -> color_eyre::Result<Option<CachedEntry>> {
      Err(eyre!("storage unavailable"))
    }

    fn match_any(&self, _: &CacheKey) -> color_eyre::Result<Option<CachedEntry>> {
      Ok(None)
    }

    fn entry_count(&self, _: &str) -> color_eyre::Result<usize> {
      Ok(0)
    }

    fn registered_version(&self) -> color_eyre::Result<Option<String>> {
      Ok(None)
    }

    fn set_registered_version(&self, _: &str) -> color_eyre::Result<()> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_storage_failures_never_fail_the_fetch() {
    let network = Arc::new(MockFetcher::new());
    network.route(&url("/"), 200, b"root");
    network.route(&url("/covers/a.png"), 200, b"png");
    network.route(&url("/api/manga"), 200, b"[]");
    let worker = OfflineWorker::new(
      Arc::clone(&network),
      Generations::new(Arc::new(ReadOnlyStorage), "v1"),
      Url::parse(ORIGIN).unwrap(),
      vec!["/".to_string()],
    );

    let report = worker.install().await;
    assert_eq!(report.failed, vec!["/"]);
    worker.activate().await;

    let image = worker.handle_fetch(&get("/covers/a.png")).await.unwrap();
    let api = worker.handle_fetch(&get("/api/manga")).await.unwrap();
    worker.settle().await;

    assert_eq!(image.data.bytes(), b"png");
    assert_eq!(api.data.bytes(), b"[]");
  }
}
