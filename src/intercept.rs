//! Explicit interceptor chain between callers and the network.
//!
//! Every request walks the registered interceptors in order. An interceptor
//! either answers the request or hands it to the next one. When nobody answers,
//! the request goes to the network fetcher.

use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tracing::trace;

use crate::fetch::{FetchError, Fetcher};
use crate::http::{Request, Response};

/// Outcome of one interceptor looking at a request.
pub enum Intercepted {
  /// The interceptor produced the final result
  Respond(Result<Response, FetchError>),
  /// Pass the (possibly rewritten) request down the chain
  Next(Request),
}

pub trait Interceptor: Send + Sync {
  fn intercept<'a>(&'a self, request: Request) -> BoxFuture<'a, Intercepted>;
}

/// Client that routes every request through the interceptor chain.
pub struct InterceptingClient<F: Fetcher> {
  chain: Arc<RwLock<Vec<Arc<dyn Interceptor>>>>,
  network: Arc<F>,
}

impl<F: Fetcher> Clone for InterceptingClient<F> {
  fn clone(&self) -> Self {
    Self {
      chain: Arc::clone(&self.chain),
      network: Arc::clone(&self.network),
    }
  }
}

impl<F: Fetcher> InterceptingClient<F> {
  pub fn new(network: F) -> Self {
    Self {
      chain: Arc::new(RwLock::new(Vec::new())),
      network: Arc::new(network),
    }
  }

  /// Append an interceptor to the end of the chain.
  pub fn register(&self, interceptor: Arc<dyn Interceptor>) {
    match self.chain.write() {
      Ok(mut chain) => chain.push(interceptor),
      Err(poisoned) => poisoned.into_inner().push(interceptor),
    }
  }

  fn snapshot(&self) -> Vec<Arc<dyn Interceptor>> {
    match self.chain.read() {
      Ok(chain) => chain.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  /// Send a request through the chain.
  pub async fn send(&self, request: Request) -> Result<Response, FetchError> {
    let mut request = request;

    for interceptor in self.snapshot() {
      match interceptor.intercept(request).await {
        Intercepted::Respond(result) => return result,
        Intercepted::Next(next) => request = next,
      }
    }

    trace!(url = %request.url, "No interceptor answered, going to network");
    self.network.fetch(&request).await
  }
}
