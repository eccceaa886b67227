//! Reactive token state driven by storage change events.

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use super::token::{fingerprint, TokenKey, TokenManager};

/// Current token as a watch channel.
///
/// Updated whenever any of the token keys changes in the backing store,
/// locally or from another process. Changes to other keys are ignored.
pub struct TokenWatch {
  rx: watch::Receiver<Option<String>>,
  task: JoinHandle<()>,
}

impl TokenWatch {
  pub(crate) fn spawn(tokens: TokenManager) -> Self {
    // Subscribe before the initial read so no write slips between them
    let mut events = tokens.store().subscribe();
    let (tx, rx) = watch::channel(tokens.current());

    let task = tokio::spawn(async move {
      loop {
        match events.recv().await {
          Ok(event) => {
            if TokenKey::from_storage_key(&event.key).is_none() {
              continue;
            }
          }
          // Missed events; re-read below
          Err(broadcast::error::RecvError::Lagged(_)) => {}
          Err(broadcast::error::RecvError::Closed) => break,
        }

        let current = tokens.current();
        let changed = tx.send_if_modified(|token| {
          if *token != current {
            *token = current.clone();
            true
          } else {
            false
          }
        });

        if changed {
          debug!(
            token = %current.as_deref().map(fingerprint).unwrap_or_default(),
            "auth token changed"
          );
        }
        if tx.is_closed() {
          break;
        }
      }
    });

    Self { rx, task }
  }

  /// Token as of the last observed change.
  pub fn current(&self) -> Option<String> {
    self.rx.borrow().clone()
  }

  /// Whether a change arrived since the last `current`-marking read.
  pub fn has_changed(&self) -> bool {
    self.rx.has_changed().unwrap_or(false)
  }

  /// Wait for the next token change and return the new value.
  pub async fn changed(&mut self) -> Option<String> {
    if self.rx.changed().await.is_err() {
      return self.current();
    }
    self.rx.borrow_and_update().clone()
  }

  /// A receiver for consumers that want the raw channel.
  pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
    self.rx.clone()
  }
}

impl Drop for TokenWatch {
  fn drop(&mut self) {
    self.task.abort();
  }
}
