//! Async query abstraction for data fetching.
//!
//! A `Query<T>` owns the loading state of one piece of remote data. Fetches
//! run on the tokio runtime and report back over a channel that the view
//! drains in its `tick()`.
//!
//! Every fetch is tagged with a generation number. Starting a new fetch
//! bumps the generation, and results carrying an older generation are
//! dropped when they arrive. A slow response for a superseded filter state
//! can therefore never overwrite the data of a newer one.
//!
//! # Example
//!
//! ```ignore
//! let cache = keyed_cache.clone();
//! let mut query = Query::new(move || {
//!     let cache = cache.clone();
//!     async move {
//!         cache
//!             .get("/api/sel/seasons")
//!             .await
//!             .map(|r| r.data)
//!             .map_err(|e| e.to_string())
//!     }
//! });
//!
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//! ```

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use tokio::sync::mpsc;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

type Tagged<T> = (u64, Result<T, String>);

/// Async query with loading state and a generation guard.
pub struct Query<T> {
  state: QueryState<T>,
  fetcher: Option<FetcherFn<T>>,
  generation: u64,
  tx: mpsc::UnboundedSender<Tagged<T>>,
  rx: mpsc::UnboundedReceiver<Tagged<T>>,
}

impl<T: Send + 'static> Query<T> {
  /// Create a query with a fixed fetcher, called on every `fetch()` or
  /// `refetch()`.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    let mut query = Self::manual();
    query.fetcher = Some(Box::new(move || Box::pin(fetcher())));
    query
  }

  /// Create a query without a fetcher. Work is supplied per call to `run()`.
  pub fn manual() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      state: QueryState::Idle,
      fetcher: None,
      generation: 0,
      tx,
      rx,
    }
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// Generation of the most recently started fetch.
  #[cfg(test)]
  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// Start fetching unless a fetch is already in flight.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.refetch();
  }

  /// Start a new fetch, superseding any fetch in flight.
  pub fn refetch(&mut self) {
    let Some(fetcher) = &self.fetcher else {
      return;
    };
    let future = fetcher();
    self.start(future);
  }

  /// Run `future` as the newest generation of this query.
  pub fn run<Fut>(&mut self, future: Fut)
  where
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    self.start(Box::pin(future));
  }

  /// Drain finished fetches. Returns `true` if the state changed.
  ///
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok((generation, result)) = self.rx.try_recv() {
      if generation != self.generation {
        tracing::trace!(
          generation,
          current = self.generation,
          "discarding superseded query result"
        );
        continue;
      }
      self.state = match result {
        Ok(data) => QueryState::Success(data),
        Err(error) => QueryState::Error(error),
      };
      changed = true;
    }
    changed
  }

  fn start(&mut self, future: BoxFuture<T>) {
    self.generation += 1;
    self.state = QueryState::Loading;

    let generation = self.generation;
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let result = match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err("Query was cancelled".to_string()),
      };
      // Receiver may have been dropped with its view
      let _ = tx.send((generation, result));
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("generation", &self.generation)
      .finish_non_exhaustive()
  }
}
