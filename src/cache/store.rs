//! In-memory query result cache.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use super::key::QueryKey;
use crate::error::ApiError;
use crate::registry::QueryName;

const EVENT_CAPACITY: usize = 256;

type AnyValue = Arc<dyn Any + Send + Sync>;

/// A cached query result.
pub struct CacheEntry {
  value: Option<AnyValue>,
  fetched_at: Option<Instant>,
  stale_time: Duration,
  error: Option<Arc<ApiError>>,
  invalidated: bool,
  last_used: Instant,
}

impl CacheEntry {
  fn empty(now: Instant) -> Self {
    Self {
      value: None,
      fetched_at: None,
      stale_time: Duration::ZERO,
      error: None,
      invalidated: false,
      last_used: now,
    }
  }

  /// Stale entries are served but refetched on the next read.
  pub fn is_stale(&self, now: Instant) -> bool {
    if self.invalidated {
      return true;
    }
    match self.fetched_at {
      Some(fetched_at) => now.duration_since(fetched_at) >= self.stale_time,
      None => true,
    }
  }

  fn value<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
    self.value.clone()?.downcast::<T>().ok()
  }
}

/// Read-only view of an entry's metadata.
#[derive(Debug, Clone)]
pub struct EntryStatus {
  pub has_data: bool,
  pub is_stale: bool,
  pub invalidated: bool,
  pub fetched_at: Option<Instant>,
  pub error: Option<Arc<ApiError>>,
}

/// Something happened to a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// New data was stored
  Updated(QueryKey),
  /// A fetch failed
  Failed(QueryKey),
  /// The entry was marked stale and should be refetched by observers
  Invalidated(QueryKey),
  /// The entry was evicted
  Removed(QueryKey),
  /// Every entry was dropped
  Cleared,
}

/// Counters bumped whenever cached results stop being trustworthy.
///
/// A fetch records the generation of its query name before calling out and
/// only stores its result if the generation has not moved since.
#[derive(Default)]
struct Generations {
  cleared: u64,
  by_name: HashMap<QueryName, u64>,
}

impl Generations {
  fn current(&self, name: QueryName) -> u64 {
    self.cleared + self.by_name.get(&name).copied().unwrap_or(0)
  }

  fn bump(&mut self, name: QueryName) {
    *self.by_name.entry(name).or_insert(0) += 1;
  }
}

struct CacheInner {
  // Lock order: generations before entries
  generations: Mutex<Generations>,
  entries: Mutex<HashMap<QueryKey, CacheEntry>>,
  observers: Mutex<HashMap<QueryKey, usize>>,
  events: broadcast::Sender<CacheEvent>,
}

/// Shared query cache. Clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<CacheInner>,
}

impl QueryCache {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      inner: Arc::new(CacheInner {
        generations: Mutex::new(Generations::default()),
        entries: Mutex::new(HashMap::new()),
        observers: Mutex::new(HashMap::new()),
        events,
      }),
    }
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
    self
      .inner
      .entries
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn generations(&self) -> MutexGuard<'_, Generations> {
    self
      .inner
      .generations
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn observers(&self) -> MutexGuard<'_, HashMap<QueryKey, usize>> {
    self
      .inner
      .observers
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn emit(&self, event: CacheEvent) {
    // No subscribers is fine
    let _ = self.inner.events.send(event);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.inner.events.subscribe()
  }

  /// Cached value if present and fresh.
  pub fn get_fresh<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
    let now = Instant::now();
    let mut entries = self.entries();
    let entry = entries.get_mut(key)?;
    entry.last_used = now;
    if entry.is_stale(now) {
      return None;
    }
    entry.value()
  }

  /// Cached value regardless of staleness.
  pub fn get<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
    let now = Instant::now();
    let mut entries = self.entries();
    let entry = entries.get_mut(key)?;
    entry.last_used = now;
    entry.value()
  }

  pub fn status(&self, key: &QueryKey) -> Option<EntryStatus> {
    let now = Instant::now();
    let entries = self.entries();
    entries.get(key).map(|entry| EntryStatus {
      has_data: entry.value.is_some(),
      is_stale: entry.is_stale(now),
      invalidated: entry.invalidated,
      fetched_at: entry.fetched_at,
      error: entry.error.clone(),
    })
  }

  /// Absent entries count as stale.
  pub fn is_stale(&self, key: &QueryKey) -> bool {
    self.status(key).map(|s| s.is_stale).unwrap_or(true)
  }

  /// Generation to pass to [`QueryCache::set_if_current`] for a fetch of
  /// `name` that is about to start.
  pub fn generation(&self, name: QueryName) -> u64 {
    self.generations().current(name)
  }

  /// Store a fetched value, resetting staleness and any previous error.
  pub fn set<T: Send + Sync + 'static>(&self, key: QueryKey, value: Arc<T>, stale_time: Duration) {
    let generations = self.generations();
    self.write(generations, key, value, stale_time);
  }

  /// Store a value fetched at `generation`, unless the entry was
  /// invalidated or the cache cleared while the fetch was in flight.
  ///
  /// Returns whether the value was stored.
  pub fn set_if_current<T: Send + Sync + 'static>(
    &self,
    key: QueryKey,
    value: Arc<T>,
    stale_time: Duration,
    generation: u64,
  ) -> bool {
    let generations = self.generations();
    if generations.current(key.name) != generation {
      debug!(key = %key, "discarding result fetched before invalidation");
      return false;
    }
    self.write(generations, key, value, stale_time);
    true
  }

  fn write<T: Send + Sync + 'static>(
    &self,
    generations: MutexGuard<'_, Generations>,
    key: QueryKey,
    value: Arc<T>,
    stale_time: Duration,
  ) {
    let now = Instant::now();
    let value: AnyValue = value;
    {
      let mut entries = self.entries();
      let entry = entries
        .entry(key.clone())
        .or_insert_with(|| CacheEntry::empty(now));
      entry.value = Some(value);
      entry.fetched_at = Some(now);
      entry.stale_time = stale_time;
      entry.error = None;
      entry.invalidated = false;
      entry.last_used = now;
    }
    drop(generations);
    debug!(key = %key, "cache updated");
    self.emit(CacheEvent::Updated(key));
  }

  /// Record a failed fetch. Previously cached data is kept.
  pub fn set_error(&self, key: QueryKey, error: Arc<ApiError>) {
    let now = Instant::now();
    {
      let mut entries = self.entries();
      let entry = entries
        .entry(key.clone())
        .or_insert_with(|| CacheEntry::empty(now));
      entry.error = Some(error);
      entry.last_used = now;
    }
    self.emit(CacheEvent::Failed(key));
  }

  /// Mark every entry of `name` stale. Returns the affected keys.
  pub fn invalidate(&self, name: QueryName) -> Vec<QueryKey> {
    let keys: Vec<QueryKey> = {
      let mut generations = self.generations();
      generations.bump(name);
      let mut entries = self.entries();
      entries
        .iter_mut()
        .filter(|(key, _)| key.belongs_to(name))
        .map(|(key, entry)| {
          entry.invalidated = true;
          key.clone()
        })
        .collect()
    };

    if !keys.is_empty() {
      info!(query = name.as_str(), entries = keys.len(), "invalidated");
    }
    for key in &keys {
      self.emit(CacheEvent::Invalidated(key.clone()));
    }
    keys
  }

  /// Mark one exact entry stale.
  pub fn invalidate_key(&self, key: &QueryKey) -> bool {
    let found = {
      let mut generations = self.generations();
      generations.bump(key.name);
      match self.entries().get_mut(key) {
        Some(entry) => {
          entry.invalidated = true;
          true
        }
        None => false,
      }
    };
    if found {
      self.emit(CacheEvent::Invalidated(key.clone()));
    }
    found
  }

  pub fn remove(&self, key: &QueryKey) -> bool {
    let removed = self.entries().remove(key).is_some();
    if removed {
      self.emit(CacheEvent::Removed(key.clone()));
    }
    removed
  }

  pub fn clear(&self) {
    {
      let mut generations = self.generations();
      generations.cleared += 1;
      self.entries().clear();
    }
    info!("cache cleared");
    self.emit(CacheEvent::Cleared);
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries().is_empty()
  }

  pub fn keys(&self) -> Vec<QueryKey> {
    self.entries().keys().cloned().collect()
  }

  /// Register a mounted observer for `key`.
  pub fn observe(&self, key: &QueryKey) {
    *self.observers().entry(key.clone()).or_insert(0) += 1;
  }

  pub fn unobserve(&self, key: &QueryKey) {
    let mut observers = self.observers();
    if let Some(count) = observers.get_mut(key) {
      *count = count.saturating_sub(1);
      if *count == 0 {
        observers.remove(key);
      }
    }
  }

  pub fn observer_count(&self, key: &QueryKey) -> usize {
    self.observers().get(key).copied().unwrap_or(0)
  }

  /// Evict entries nobody observes that have not been used for `gc_time`.
  ///
  /// Returns the number of entries removed.
  pub fn collect_garbage(&self, gc_time: Duration) -> usize {
    let now = Instant::now();
    let observed: Vec<QueryKey> = self.observers().keys().cloned().collect();

    let removed: Vec<QueryKey> = {
      let mut entries = self.entries();
      let expired: Vec<QueryKey> = entries
        .iter()
        .filter(|(key, entry)| {
          !observed.contains(*key) && now.duration_since(entry.last_used) >= gc_time
        })
        .map(|(key, _)| key.clone())
        .collect();
      for key in &expired {
        entries.remove(key);
      }
      expired
    };

    for key in &removed {
      debug!(key = %key, "evicted");
      self.emit(CacheEvent::Removed(key.clone()));
    }
    removed.len()
  }
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(name: QueryName, id: &str) -> QueryKey {
    QueryKey::new(name, &id.to_string())
  }

  #[tokio::test(start_paused = true)]
  async fn test_fresh_within_stale_time() {
    let cache = QueryCache::new();
    let k = key(QueryName::Property, "p1");
    cache.set(k.clone(), Arc::new(7u32), Duration::from_secs(60));

    assert_eq!(cache.get_fresh::<u32>(&k).as_deref(), Some(&7));

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(cache.get_fresh::<u32>(&k).is_none());
    assert_eq!(cache.get::<u32>(&k).as_deref(), Some(&7));
  }

  #[tokio::test]
  async fn test_zero_stale_time_is_always_stale() {
    let cache = QueryCache::new();
    let k = QueryKey::bare(QueryName::Profile);
    cache.set(k.clone(), Arc::new("me".to_string()), Duration::ZERO);

    assert!(cache.is_stale(&k));
    assert!(cache.get_fresh::<String>(&k).is_none());
  }

  #[tokio::test]
  async fn test_wrong_type_reads_as_miss() {
    let cache = QueryCache::new();
    let k = QueryKey::bare(QueryName::Blogs);
    cache.set(k.clone(), Arc::new(1u8), Duration::from_secs(60));
    assert!(cache.get::<String>(&k).is_none());
  }

  #[tokio::test]
  async fn test_invalidate_marks_only_named_entries() {
    let cache = QueryCache::new();
    let mut events = cache.subscribe();
    let minute = Duration::from_secs(60);

    cache.set(key(QueryName::PropertyReviews, "p1"), Arc::new(1u32), minute);
    cache.set(key(QueryName::PropertyReviews, "p2"), Arc::new(2u32), minute);
    cache.set(QueryKey::bare(QueryName::Blogs), Arc::new(3u32), minute);

    let mut invalidated = cache.invalidate(QueryName::PropertyReviews);
    invalidated.sort_by_key(|k| k.to_string());
    assert_eq!(
      invalidated,
      vec![
        key(QueryName::PropertyReviews, "p1"),
        key(QueryName::PropertyReviews, "p2")
      ]
    );

    assert!(cache.is_stale(&key(QueryName::PropertyReviews, "p1")));
    assert!(!cache.is_stale(&QueryKey::bare(QueryName::Blogs)));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
      if let CacheEvent::Invalidated(k) = event {
        seen.push(k);
      }
    }
    assert_eq!(seen.len(), 2);
  }

  #[tokio::test]
  async fn test_set_clears_invalidation_and_error() {
    let cache = QueryCache::new();
    let k = QueryKey::bare(QueryName::Bookings);
    let minute = Duration::from_secs(60);

    cache.set(k.clone(), Arc::new(1u32), minute);
    cache.set_error(
      k.clone(),
      Arc::new(ApiError::InvalidRequest("boom".into())),
    );
    cache.invalidate_key(&k);

    let status = cache.status(&k).unwrap();
    assert!(status.invalidated);
    assert!(status.error.is_some());
    assert!(status.has_data);

    cache.set(k.clone(), Arc::new(2u32), minute);
    let status = cache.status(&k).unwrap();
    assert!(!status.invalidated);
    assert!(status.error.is_none());
    assert!(!status.is_stale);
  }

  #[tokio::test]
  async fn test_result_fetched_before_invalidation_is_discarded() {
    let cache = QueryCache::new();
    let k = QueryKey::bare(QueryName::Reviews);
    let minute = Duration::from_secs(60);
    cache.set(k.clone(), Arc::new(1u32), minute);

    let generation = cache.generation(QueryName::Reviews);
    cache.invalidate(QueryName::Reviews);

    assert!(!cache.set_if_current(k.clone(), Arc::new(2u32), minute, generation));
    let status = cache.status(&k).unwrap();
    assert!(status.invalidated);
    assert_eq!(cache.get::<u32>(&k).as_deref(), Some(&1));

    let generation = cache.generation(QueryName::Reviews);
    assert!(cache.set_if_current(k.clone(), Arc::new(3u32), minute, generation));
    assert!(!cache.is_stale(&k));
  }

  #[tokio::test]
  async fn test_invalidating_absent_entry_still_moves_generation() {
    let cache = QueryCache::new();
    let k = QueryKey::bare(QueryName::Reviews);

    let generation = cache.generation(QueryName::Reviews);
    assert!(cache.invalidate(QueryName::Reviews).is_empty());
    assert!(!cache.set_if_current(k.clone(), Arc::new(1u32), Duration::from_secs(60), generation));
    assert!(cache.status(&k).is_none());

    // other names are unaffected
    let blogs = cache.generation(QueryName::Blogs);
    cache.invalidate(QueryName::Reviews);
    assert_eq!(cache.generation(QueryName::Blogs), blogs);
  }

  #[tokio::test]
  async fn test_clear_discards_in_flight_results() {
    let cache = QueryCache::new();
    let k = QueryKey::bare(QueryName::Bookings);

    let generation = cache.generation(QueryName::Bookings);
    cache.clear();
    assert!(!cache.set_if_current(k, Arc::new(1u32), Duration::from_secs(60), generation));
    assert!(cache.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_gc_skips_observed_entries() {
    let cache = QueryCache::new();
    let watched = key(QueryName::Property, "watched");
    let idle = key(QueryName::Property, "idle");
    let minute = Duration::from_secs(60);

    cache.set(watched.clone(), Arc::new(1u32), minute);
    cache.set(idle.clone(), Arc::new(2u32), minute);
    cache.observe(&watched);

    tokio::time::advance(Duration::from_secs(301)).await;
    assert_eq!(cache.collect_garbage(Duration::from_secs(300)), 1);
    assert!(cache.get::<u32>(&watched).is_some());
    assert!(cache.get::<u32>(&idle).is_none());

    cache.unobserve(&watched);
    assert_eq!(cache.observer_count(&watched), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_gc_keeps_recently_used() {
    let cache = QueryCache::new();
    let k = QueryKey::bare(QueryName::FeaturedProperties);
    cache.set(k.clone(), Arc::new(1u32), Duration::from_secs(300));

    tokio::time::advance(Duration::from_secs(200)).await;
    let _ = cache.get::<u32>(&k);
    tokio::time::advance(Duration::from_secs(200)).await;

    assert_eq!(cache.collect_garbage(Duration::from_secs(300)), 0);
  }

  #[tokio::test]
  async fn test_clear_emits_event() {
    let cache = QueryCache::new();
    let mut events = cache.subscribe();
    cache.set(QueryKey::bare(QueryName::Blogs), Arc::new(1u32), Duration::ZERO);
    cache.clear();

    assert!(cache.is_empty());
    assert!(matches!(events.try_recv(), Ok(CacheEvent::Updated(_))));
    assert_eq!(events.try_recv().unwrap(), CacheEvent::Cleared);
  }
}
