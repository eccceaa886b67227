//! Observer handle over a cached query.
//!
//! A `Query<P, T>` is the poll-driven counterpart of a mounted data hook. It
//! shows whatever the cache already holds, fetches in the background when
//! the entry is missing or stale, and follows cache events so invalidation
//! by a mutation or an update from another observer is picked up on the
//! next `poll()`.
//!
//! # Example
//!
//! ```ignore
//! let mut query = client.query(queries::property(), "p1".to_string());
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(property) => render_property(&property),
//!     QueryState::Error(e) => render_error(&e),
//!     QueryState::Idle => {}
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::cache::{CacheEvent, KeyParams, QueryKey};
use crate::client::QueryClient;
use crate::error::ApiError;
use crate::registry::QueryDescriptor;

type FetchResult<T> = Result<Option<Arc<T>>, Arc<ApiError>>;

/// The state of a query
#[derive(Debug)]
pub enum QueryState<T> {
  /// Not started, or disabled
  Idle,
  /// Fetching with nothing to show yet
  Loading,
  Success(Arc<T>),
  Error(Arc<ApiError>),
}

impl<T> Clone for QueryState<T> {
  fn clone(&self) -> Self {
    match self {
      QueryState::Idle => QueryState::Idle,
      QueryState::Loading => QueryState::Loading,
      QueryState::Success(data) => QueryState::Success(data.clone()),
      QueryState::Error(e) => QueryState::Error(e.clone()),
    }
  }
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }
}

/// A mounted observer of one query key.
pub struct Query<P, T>
where
  P: KeyParams,
{
  client: QueryClient,
  descriptor: QueryDescriptor<P, T>,
  params: P,
  key: QueryKey,
  data: Option<Arc<T>>,
  error: Option<Arc<ApiError>>,
  receiver: Option<mpsc::UnboundedReceiver<FetchResult<T>>>,
  events: broadcast::Receiver<CacheEvent>,
}

impl<P, T> Query<P, T>
where
  P: KeyParams + Clone + Send + Sync + 'static,
  T: Send + Sync + 'static,
{
  pub(crate) fn new(client: QueryClient, descriptor: QueryDescriptor<P, T>, params: P) -> Self {
    let key = descriptor.key(&params);
    let cache = client.cache();
    let events = cache.subscribe();
    cache.observe(&key);
    let data = cache.get::<T>(&key);

    let mut query = Self {
      client,
      descriptor,
      params,
      key,
      data,
      error: None,
      receiver: None,
      events,
    };
    query.fetch();
    query
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn params(&self) -> &P {
    &self.params
  }

  pub fn state(&self) -> QueryState<T> {
    if let Some(data) = &self.data {
      return QueryState::Success(data.clone());
    }
    if self.receiver.is_some() {
      return QueryState::Loading;
    }
    match &self.error {
      Some(e) => QueryState::Error(e.clone()),
      None => QueryState::Idle,
    }
  }

  /// Latest data, possibly stale.
  pub fn data(&self) -> Option<&T> {
    self.data.as_deref()
  }

  /// Shared handle to the latest data.
  pub fn data_arc(&self) -> Option<Arc<T>> {
    self.data.clone()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_deref()
  }

  /// Fetching with no data to show.
  pub fn is_loading(&self) -> bool {
    self.data.is_none() && self.receiver.is_some()
  }

  /// Any fetch in flight, including background refreshes.
  pub fn is_fetching(&self) -> bool {
    self.receiver.is_some()
  }

  pub fn is_enabled(&self) -> bool {
    self.client.is_enabled(&self.descriptor, &self.params)
  }

  /// Start fetching if not already fetching.
  ///
  /// Served from the cache when the entry is fresh; a no-op when the query
  /// is disabled.
  pub fn fetch(&mut self) {
    if self.receiver.is_some() {
      return;
    }
    self.start_fetch(false);
  }

  /// Force a network fetch, abandoning any pending one.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start_fetch(true);
  }

  /// Switch to new parameters, moving the observer to the new key.
  pub fn set_params(&mut self, params: P) {
    let key = self.descriptor.key(&params);
    self.params = params;
    if key == self.key {
      return;
    }

    let cache = self.client.cache();
    cache.unobserve(&self.key);
    cache.observe(&key);
    self.data = cache.get::<T>(&key);
    self.error = None;
    self.receiver = None;
    self.key = key;
    self.fetch();
  }

  /// Apply pending results and cache events.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick
  /// handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = self.poll_fetch();
    changed |= self.poll_events();

    // Enabled since the last attempt, e.g. a token appeared
    if self.data.is_none() && self.error.is_none() && self.receiver.is_none() && self.is_enabled()
    {
      debug!(key = %self.key, "query enabled, fetching");
      self.start_fetch(false);
      changed = true;
    }
    changed
  }

  fn poll_fetch(&mut self) -> bool {
    let Some(receiver) = &mut self.receiver else {
      return false;
    };

    match receiver.try_recv() {
      Ok(Ok(Some(data))) => {
        self.data = Some(data);
        self.error = None;
        self.receiver = None;
        true
      }
      Ok(Ok(None)) => {
        // Disabled by the time it ran
        self.receiver = None;
        true
      }
      Ok(Err(e)) => {
        self.error = Some(e);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.receiver = None;
        true
      }
    }
  }

  fn poll_events(&mut self) -> bool {
    let mut changed = false;
    let mut refetch = false;

    loop {
      match self.events.try_recv() {
        Ok(CacheEvent::Updated(key)) if key == self.key => {
          if let Some(data) = self.client.cache().get::<T>(&self.key) {
            self.data = Some(data);
            self.error = None;
            changed = true;
          }
        }
        Ok(CacheEvent::Invalidated(key)) if key == self.key => refetch = true,
        Ok(CacheEvent::Removed(key)) if key == self.key => {
          self.reset();
          changed = true;
        }
        Ok(CacheEvent::Cleared) => {
          self.reset();
          changed = true;
        }
        Ok(_) => {}
        Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
          debug!(key = %self.key, skipped, "cache events lagged, resyncing");
          self.data = self.client.cache().get::<T>(&self.key);
          refetch |= self.client.cache().is_stale(&self.key);
          changed = true;
        }
        Err(_) => break,
      }
    }

    if refetch && self.is_enabled() {
      debug!(key = %self.key, "invalidated, refetching");
      self.refetch();
      changed = true;
    }
    changed
  }

  fn reset(&mut self) {
    self.data = None;
    self.error = None;
    self.receiver = None;
  }

  fn start_fetch(&mut self, force: bool) {
    if !self.is_enabled() {
      return;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);

    let client = self.client.clone();
    let descriptor = self.descriptor;
    let params = self.params.clone();
    tokio::spawn(async move {
      let result = if force {
        client.refetch_query(&descriptor, params).await
      } else {
        client.fetch_query(&descriptor, params).await
      };
      // Receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<P: KeyParams, T> Drop for Query<P, T> {
  fn drop(&mut self) {
    self.client.cache().unobserve(&self.key);
  }
}

impl<P: KeyParams, T> fmt::Debug for Query<P, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("has_data", &self.data.is_some())
      .field("error", &self.error)
      .field("fetching", &self.receiver.is_some())
      .finish_non_exhaustive()
  }
}
