//! Background eviction of unobserved cache entries.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::store::QueryCache;

/// Spawn a task that evicts entries unused for `gc_time`, checking every
/// `interval`.
///
/// Abort the returned handle to stop it.
pub fn spawn_gc_task(cache: QueryCache, interval: Duration, gc_time: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    info!(
      interval_secs = interval.as_secs(),
      gc_time_secs = gc_time.as_secs(),
      "starting cache gc task"
    );

    loop {
      tokio::time::sleep(interval).await;

      let removed = cache.collect_garbage(gc_time);
      if removed > 0 {
        info!(removed, "cache gc evicted entries");
      } else {
        debug!("cache gc: nothing to evict");
      }
    }
  })
}
