//! The query client: cache, remote calls, retries and invalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::api::types::{AuthResponse, Credentials, SignUpInput};
use crate::api::{ApiClient, HttpTransport, Transport};
use crate::auth::{fingerprint, TokenKey, TokenManager};
use crate::cache::{KeyParams, QueryCache, QueryKey};
use crate::config::Config;
use crate::error::{ApiError, StorageError};
use crate::mutation::Mutation;
use crate::notify::Notification;
use crate::query::Query;
use crate::rating::{summarize, RatingSummary};
use crate::registry::{mutations, queries, MutationDescriptor, QueryDescriptor, QueryName};

const NOTIFICATION_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct ClientOptions {
  /// Delay before the first retry; doubles per attempt
  pub retry_base_delay: Duration,
  pub max_retry_delay: Duration,
  /// Key variant tokens from sign-in and OAuth exchange are stored under
  pub token_key: TokenKey,
}

impl Default for ClientOptions {
  fn default() -> Self {
    Self {
      retry_base_delay: Duration::from_secs(1),
      max_retry_delay: Duration::from_secs(30),
      token_key: TokenKey::default(),
    }
  }
}

impl ClientOptions {
  pub fn from_config(config: &Config) -> Self {
    Self {
      retry_base_delay: config.retry_base_delay(),
      token_key: config.auth.token_key,
      ..Self::default()
    }
  }
}

struct ClientInner {
  api: ApiClient,
  cache: QueryCache,
  tokens: TokenManager,
  options: ClientOptions,
  fetch_locks: FetchLocks,
  notifications: broadcast::Sender<Notification>,
}

type FetchLocks = Mutex<HashMap<QueryKey, Arc<tokio::sync::Mutex<()>>>>;

/// A held per-key fetch lock.
///
/// Dropping it, including when the owning future is cancelled, releases the
/// lock and forgets the key once no other caller is waiting on it.
struct KeyLock<'a> {
  locks: &'a FetchLocks,
  key: QueryKey,
  lock: Arc<tokio::sync::Mutex<()>>,
  guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLock<'_> {
  fn drop(&mut self) {
    self.guard.take();
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    // The map holds one reference and we hold the other
    let ours = locks
      .get(&self.key)
      .is_some_and(|held| Arc::ptr_eq(held, &self.lock));
    if ours && Arc::strong_count(&self.lock) <= 2 {
      locks.remove(&self.key);
    }
  }
}

/// Entry point for all reads and writes against the rental service.
///
/// Cheap to clone; clones share the cache, the token manager and the
/// transport.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<ClientInner>,
}

impl QueryClient {
  pub fn new(transport: Arc<dyn Transport>, tokens: TokenManager, options: ClientOptions) -> Self {
    let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
    Self {
      inner: Arc::new(ClientInner {
        api: ApiClient::new(transport, tokens.clone()),
        cache: QueryCache::new(),
        tokens,
        options,
        fetch_locks: Mutex::new(HashMap::new()),
        notifications,
      }),
    }
  }

  /// Client talking HTTP to the configured service.
  pub fn from_config(config: &Config, tokens: TokenManager) -> Result<Self, ApiError> {
    let transport = HttpTransport::new(&config.api.base_url, config.timeout())?;
    Ok(Self::new(
      Arc::new(transport),
      tokens,
      ClientOptions::from_config(config),
    ))
  }

  pub fn api(&self) -> &ApiClient {
    &self.inner.api
  }

  pub fn cache(&self) -> &QueryCache {
    &self.inner.cache
  }

  pub fn tokens(&self) -> &TokenManager {
    &self.inner.tokens
  }

  pub fn options(&self) -> &ClientOptions {
    &self.inner.options
  }

  /// Success and failure messages from mutations that declare them.
  pub fn notifications(&self) -> broadcast::Receiver<Notification> {
    self.inner.notifications.subscribe()
  }

  // ==========================================================================
  // Queries
  // ==========================================================================

  /// Mount an observer for `params`. See [`Query`].
  pub fn query<P, T>(&self, descriptor: QueryDescriptor<P, T>, params: P) -> Query<P, T>
  where
    P: KeyParams + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
  {
    Query::new(self.clone(), descriptor, params)
  }

  /// Read through the cache.
  ///
  /// Returns `Ok(None)` without calling the service when the query is
  /// disabled (missing parameters or missing token). Fresh cached data is
  /// returned as is; otherwise the remote call runs with the descriptor's
  /// retry policy.
  pub async fn fetch_query<P, T>(
    &self,
    descriptor: &QueryDescriptor<P, T>,
    params: P,
  ) -> Result<Option<Arc<T>>, Arc<ApiError>>
  where
    P: KeyParams + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
  {
    self.run_query(descriptor, params, false).await
  }

  /// Like [`QueryClient::fetch_query`] but ignores cached freshness.
  pub async fn refetch_query<P, T>(
    &self,
    descriptor: &QueryDescriptor<P, T>,
    params: P,
  ) -> Result<Option<Arc<T>>, Arc<ApiError>>
  where
    P: KeyParams + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
  {
    self.run_query(descriptor, params, true).await
  }

  pub(crate) fn is_enabled<P, T>(&self, descriptor: &QueryDescriptor<P, T>, params: &P) -> bool {
    // Only pay for a storage read when the query cares about the token
    let has_token = descriptor.requires_token() && self.inner.tokens.has_token();
    descriptor.is_enabled(params, has_token)
  }

  async fn run_query<P, T>(
    &self,
    descriptor: &QueryDescriptor<P, T>,
    params: P,
    force: bool,
  ) -> Result<Option<Arc<T>>, Arc<ApiError>>
  where
    P: KeyParams + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
  {
    let key = descriptor.key(&params);
    if !self.is_enabled(descriptor, &params) {
      debug!(key = %key, "query disabled");
      return Ok(None);
    }

    let cache = &self.inner.cache;
    if !force {
      if let Some(data) = cache.get_fresh::<T>(&key) {
        debug!(key = %key, "cache hit");
        return Ok(Some(data));
      }
    }

    let _lock = self.lock_key(&key).await;

    // Another caller may have fetched while we waited
    if !force {
      if let Some(data) = cache.get_fresh::<T>(&key) {
        debug!(key = %key, "cache hit after wait");
        return Ok(Some(data));
      }
    }

    debug!(key = %key, "cache miss, fetching");
    let generation = cache.generation(key.name);
    let result = self.fetch_with_retry(descriptor, params).await;
    match result {
      Ok(value) => {
        let value = Arc::new(value);
        cache.set_if_current(key.clone(), value.clone(), descriptor.stale_time(), generation);
        Ok(Some(value))
      }
      Err(e) => {
        let e = Arc::new(e);
        warn!(key = %key, error = %e, "query failed");
        cache.set_error(key.clone(), e.clone());
        Err(e)
      }
    }
  }

  async fn fetch_with_retry<P, T>(
    &self,
    descriptor: &QueryDescriptor<P, T>,
    params: P,
  ) -> Result<T, ApiError>
  where
    P: Clone,
  {
    let mut attempt = 0;
    loop {
      match (descriptor.fetch)(self.inner.api.clone(), params.clone()).await {
        Ok(value) => return Ok(value),
        Err(e) if attempt < descriptor.retry() && e.is_retryable() => {
          let delay = self.retry_delay(attempt);
          attempt += 1;
          warn!(
            query = descriptor.name.as_str(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "retrying query"
          );
          tokio::time::sleep(delay).await;
        }
        Err(e) => return Err(e),
      }
    }
  }

  /// Back-off before retry number `attempt + 1`.
  pub fn retry_delay(&self, attempt: u32) -> Duration {
    let options = &self.inner.options;
    let factor = 2u32.saturating_pow(attempt);
    options
      .retry_base_delay
      .saturating_mul(factor)
      .min(options.max_retry_delay)
  }

  /// Wait for exclusive fetch rights on `key`.
  async fn lock_key(&self, key: &QueryKey) -> KeyLock<'_> {
    let lock = self
      .inner
      .fetch_locks
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(key.clone())
      .or_default()
      .clone();
    // Built before waiting so a cancelled waiter cleans up too
    let mut held = KeyLock {
      locks: &self.inner.fetch_locks,
      key: key.clone(),
      lock: lock.clone(),
      guard: None,
    };
    held.guard = Some(lock.lock_owned().await);
    held
  }

  /// Cached data for `params`, fresh or not.
  pub fn get_query_data<P, T>(&self, descriptor: &QueryDescriptor<P, T>, params: &P) -> Option<Arc<T>>
  where
    P: KeyParams,
    T: Send + Sync + 'static,
  {
    self.inner.cache.get(&descriptor.key(params))
  }

  /// Seed or overwrite cached data, as if it had just been fetched.
  pub fn set_query_data<P, T>(&self, descriptor: &QueryDescriptor<P, T>, params: &P, value: T)
  where
    P: KeyParams,
    T: Send + Sync + 'static,
  {
    self
      .inner
      .cache
      .set(descriptor.key(params), Arc::new(value), descriptor.stale_time());
  }

  /// Mark every cached entry of `name` stale.
  pub fn invalidate(&self, name: QueryName) -> Vec<QueryKey> {
    self.inner.cache.invalidate(name)
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  /// Create a mutation handle. See [`Mutation`].
  pub fn mutation<I, O>(&self, descriptor: MutationDescriptor<I, O>) -> Mutation<I, O>
  where
    I: Send + 'static,
    O: Send + Sync + 'static,
  {
    Mutation::new(self.clone(), descriptor)
  }

  /// Run a write once, then invalidate the mutation's declared queries.
  pub async fn mutate<I, O>(&self, descriptor: &MutationDescriptor<I, O>, input: I) -> Result<O, ApiError> {
    self.mutate_with(descriptor, input, |_| {}).await
  }

  /// Like [`QueryClient::mutate`], running `on_success` before invalidation.
  pub async fn mutate_with<I, O, F>(
    &self,
    descriptor: &MutationDescriptor<I, O>,
    input: I,
    on_success: F,
  ) -> Result<O, ApiError>
  where
    F: FnOnce(&O),
  {
    let name = descriptor.name;
    debug!(mutation = name.as_str(), "mutation started");

    match (descriptor.call)(self.inner.api.clone(), input).await {
      Ok(output) => {
        on_success(&output);
        for target in descriptor.invalidates() {
          self.inner.cache.invalidate(*target);
        }
        if let Some(notice) = name.notice() {
          self.notify(Notification::success(notice.success));
        }
        debug!(mutation = name.as_str(), "mutation succeeded");
        Ok(output)
      }
      Err(e) => {
        warn!(mutation = name.as_str(), error = %e, "mutation failed");
        if let Some(notice) = name.notice() {
          self.notify(Notification::error(notice.failure));
        }
        Err(e)
      }
    }
  }

  fn notify(&self, notification: Notification) {
    let _ = self.inner.notifications.send(notification);
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  /// Store a freshly issued token under the configured key variant.
  pub(crate) fn store_token(&self, token: &str) {
    let key = self.inner.options.token_key;
    if let Err(e) = self.inner.tokens.set(key, token) {
      warn!(error = %e, token = %fingerprint(token), "failed to persist auth token");
    }
  }

  pub async fn sign_in(&self, credentials: Credentials) -> Result<AuthResponse, ApiError> {
    self
      .mutate_with(&mutations::sign_in(), credentials, |response| {
        self.store_token(&response.token)
      })
      .await
  }

  pub async fn sign_up(&self, input: SignUpInput) -> Result<AuthResponse, ApiError> {
    self
      .mutate_with(&mutations::sign_up(), input, |response| {
        self.store_token(&response.token)
      })
      .await
  }

  /// Forget the token and every cached result.
  pub fn sign_out(&self) -> Result<(), StorageError> {
    self.inner.tokens.clear()?;
    self.inner.cache.clear();
    Ok(())
  }

  // ==========================================================================
  // Derived data
  // ==========================================================================

  /// Average review rating for one property, computed from the review list.
  pub async fn property_rating(&self, property_id: &str) -> Result<RatingSummary, Arc<ApiError>> {
    let reviews = self.fetch_query(&queries::reviews(), ()).await?;
    Ok(match reviews {
      Some(reviews) => summarize(&reviews, property_id),
      None => RatingSummary::default(),
    })
  }
}
