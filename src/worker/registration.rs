//! One-time registration of the worker with a client's interceptor chain.

use std::sync::Arc;

use tracing::{info, warn};

use super::OfflineWorker;
use crate::cache::run_blocking;
use crate::fetch::Fetcher;
use crate::intercept::InterceptingClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
  /// A new version was installed and activated
  Installed { deleted: Vec<String> },
  /// The same version was already active
  Resumed,
  /// Registration failed, requests go straight to the network
  Failed,
}

/// Register the worker with the client.
///
/// Install and activate only run when the persisted version differs from the
/// worker's, or when `force` is set. Failures are logged and leave the client
/// without the worker.
pub async fn register<N, F>(
  worker: Arc<OfflineWorker<N>>,
  client: &InterceptingClient<F>,
  force: bool,
) -> Registration
where
  N: Fetcher + 'static,
  F: Fetcher,
{
  let storage = Arc::clone(worker.generations().storage());

  let reading = Arc::clone(&storage);
  let registered = match run_blocking(move || reading.registered_version()).await {
    Ok(version) => version,
    Err(e) => {
      warn!(error = %e, "Offline worker registration failed");
      return Registration::Failed;
    }
  };

  let outcome = if !force && registered.as_deref() == Some(worker.version()) {
    worker.resume().await;
    Registration::Resumed
  } else {
    info!(
      previous = registered.as_deref().unwrap_or("none"),
      version = worker.version(),
      "New offline worker version"
    );
    worker.install().await;
    let deleted = worker.activate().await;
    let version = worker.version().to_string();
    if let Err(e) = run_blocking(move || storage.set_registered_version(&version)).await {
      warn!(error = %e, "Failed to record worker version");
    }
    Registration::Installed { deleted }
  };

  client.register(worker);
  outcome
}
