//! Async query and mutation abstractions for the UI event loop.
//!
//! Inspired by TanStack Query: a `Query<T>` owns a fetcher and its
//! loading/success/error state, a `Mutation<I, T>` fires writes and hands
//! back every settled call together with the input it was made with.
//! Both run their futures on tokio and report through channels that the
//! event loop polls on each tick, so all state stays on the UI task.
//!
//! # Example
//!
//! ```ignore
//! let client = items_client.clone();
//! let mut query = Query::new(move |mode| {
//!     let client = client.clone();
//!     async move {
//!         let result = match mode {
//!             FetchMode::PreferCache => client.list_items().await,
//!             FetchMode::Refresh => client.refresh_items().await,
//!         };
//!         result.map_err(|e| e.to_string())
//!     }
//! });
//!
//! // Start fetching
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//! ```

use futures::future::BoxFuture;
use std::future::Future;
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

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
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

/// How much a fetch may rely on cached data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
  /// Fresh cached data is good enough
  PreferCache,
  /// User asked for new data, go to the source
  Refresh,
}

/// A factory function that creates futures for fetching data
type FetcherFn<T> = Box<dyn Fn(FetchMode) -> BoxFuture<'static, Result<T, String>> + Send + Sync>;

/// Async query for data fetching with state management.
pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, String>>>,
}

impl<T: Send + 'static> Query<T> {
  /// Create a new query with the given fetcher function.
  ///
  /// The fetcher is called each time `fetch()` or `refetch()` is invoked,
  /// with [`FetchMode::PreferCache`] and [`FetchMode::Refresh`] respectively.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn(FetchMode) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move |mode| Box::pin(fetcher(mode))),
      receiver: None,
    }
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// Get the data if the query succeeded.
  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// Start fetching data if not already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch(FetchMode::PreferCache);
  }

  /// Force a refetch, even if already loading or data exists.
  pub fn refetch(&mut self) {
    // Cancel any pending fetch by dropping the receiver
    self.receiver = None;
    self.start_fetch(FetchMode::Refresh);
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed (data arrived or error occurred).
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Sender dropped without sending - treat as error
        self.state = QueryState::Error("Query was cancelled".to_string());
        self.receiver = None;
        true
      }
    }
  }

  fn start_fetch(&mut self, mode: FetchMode) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let future = (self.fetcher)(mode);
    tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

/// One finished mutation call
#[derive(Debug)]
pub struct Settled<I, T> {
  /// The input the call was made with
  pub input: I,
  pub result: Result<T, String>,
}

type MutatorFn<I, T> = Box<dyn Fn(I) -> BoxFuture<'static, Result<T, String>> + Send + Sync>;

/// Async write operation.
///
/// Every `mutate()` call runs independently; there is no deduplication or
/// cancellation. Results come back from `poll()` in completion order, which
/// is not necessarily call order.
pub struct Mutation<I, T> {
  mutator: MutatorFn<I, T>,
  tx: mpsc::UnboundedSender<Settled<I, T>>,
  rx: mpsc::UnboundedReceiver<Settled<I, T>>,
  in_flight: usize,
}

impl<I: Clone + Send + 'static, T: Send + 'static> Mutation<I, T> {
  pub fn new<F, Fut>(mutator: F) -> Self
  where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      mutator: Box::new(move |input| Box::pin(mutator(input))),
      tx,
      rx,
      in_flight: 0,
    }
  }

  /// Number of calls that haven't been polled back yet
  pub fn in_flight(&self) -> usize {
    self.in_flight
  }

  /// Start a call with `input`.
  pub fn mutate(&mut self, input: I) {
    let future = (self.mutator)(input.clone());
    let tx = self.tx.clone();
    self.in_flight += 1;

    tokio::spawn(async move {
      let result = future.await;
      let _ = tx.send(Settled { input, result });
    });
  }

  /// Drain every call that settled since the last poll.
  pub fn poll(&mut self) -> Vec<Settled<I, T>> {
    let mut settled = Vec::new();
    while let Ok(outcome) = self.rx.try_recv() {
      settled.push(outcome);
    }
    self.in_flight = self.in_flight.saturating_sub(settled.len());
    settled
  }
}

impl<I, T> std::fmt::Debug for Mutation<I, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Mutation")
      .field("in_flight", &self.in_flight)
      .finish_non_exhaustive()
  }
}
