//! Poll-driven handle for write operations.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::client::QueryClient;
use crate::error::ApiError;
use crate::registry::MutationDescriptor;

type OnSuccess<O> = Arc<dyn Fn(&O) + Send + Sync>;

/// The state of a mutation
#[derive(Debug)]
pub enum MutationState<O> {
  Idle,
  Pending,
  Success(Arc<O>),
  Error(Arc<ApiError>),
}

impl<O> Clone for MutationState<O> {
  fn clone(&self) -> Self {
    match self {
      MutationState::Idle => MutationState::Idle,
      MutationState::Pending => MutationState::Pending,
      MutationState::Success(data) => MutationState::Success(data.clone()),
      MutationState::Error(e) => MutationState::Error(e.clone()),
    }
  }
}

/// A write operation that can be triggered from an event loop.
///
/// Each `mutate` issues exactly one remote call. On success the optional
/// callback runs first, then the descriptor's queries are invalidated.
pub struct Mutation<I, O> {
  client: QueryClient,
  descriptor: MutationDescriptor<I, O>,
  state: MutationState<O>,
  receiver: Option<mpsc::UnboundedReceiver<Result<O, ApiError>>>,
  on_success: Option<OnSuccess<O>>,
}

impl<I, O> Mutation<I, O>
where
  I: Send + 'static,
  O: Send + Sync + 'static,
{
  pub(crate) fn new(client: QueryClient, descriptor: MutationDescriptor<I, O>) -> Self {
    Self {
      client,
      descriptor,
      state: MutationState::Idle,
      receiver: None,
      on_success: None,
    }
  }

  /// Run `callback` with the result of every successful call, before
  /// invalidation.
  pub fn with_on_success<F>(mut self, callback: F) -> Self
  where
    F: Fn(&O) + Send + Sync + 'static,
  {
    self.on_success = Some(Arc::new(callback));
    self
  }

  pub fn state(&self) -> &MutationState<O> {
    &self.state
  }

  pub fn data(&self) -> Option<&O> {
    match &self.state {
      MutationState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ApiError> {
    match &self.state {
      MutationState::Error(e) => Some(e),
      _ => None,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self.state, MutationState::Pending)
  }

  /// Start the remote call. A result still pending from an earlier call is
  /// abandoned by this handle but the call itself completes.
  pub fn mutate(&mut self, input: I) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = MutationState::Pending;

    let client = self.client.clone();
    let descriptor = self.descriptor;
    let on_success = self.on_success.clone();
    tokio::spawn(async move {
      let result = client
        .mutate_with(&descriptor, input, |output| {
          if let Some(callback) = &on_success {
            callback(output);
          }
        })
        .await;
      let _ = tx.send(result);
    });
  }

  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = &mut self.receiver else {
      return false;
    };

    match receiver.try_recv() {
      Ok(Ok(output)) => {
        self.state = MutationState::Success(Arc::new(output));
        self.receiver = None;
        true
      }
      Ok(Err(e)) => {
        self.state = MutationState::Error(Arc::new(e));
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = MutationState::Idle;
        self.receiver = None;
        true
      }
    }
  }

  /// Back to `Idle`, dropping any pending result.
  pub fn reset(&mut self) {
    self.state = MutationState::Idle;
    self.receiver = None;
  }
}

impl<I, O> fmt::Debug for Mutation<I, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Mutation")
      .field("name", &self.descriptor.name)
      .field("pending", &self.receiver.is_some())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::FavoriteToggle;
  use crate::registry::{mutations, queries};
  use crate::testing::{settle, TestHarness};
  use serde_json::json;
  use std::sync::atomic::{AtomicBool, Ordering};

  #[tokio::test]
  async fn test_mutation_success() {
    let h = TestHarness::signed_in();
    h.transport.respond(
      "POST favorites/p1/toggle",
      json!({ "propertyId": "p1", "favorited": true }),
    );

    let mut toggle = h.client.mutation(mutations::toggle_favorite());
    toggle.mutate("p1".to_string());
    assert!(toggle.is_loading());

    settle().await;
    assert!(toggle.poll());
    assert_eq!(
      toggle.data(),
      Some(&FavoriteToggle {
        property_id: "p1".into(),
        favorited: true,
      })
    );
  }

  #[tokio::test]
  async fn test_mutation_error_is_not_retried() {
    let h = TestHarness::signed_in();
    h.transport.fail("POST bookings/b1/cancel", 503);

    let mut cancel = h.client.mutation(mutations::cancel_booking());
    cancel.mutate("b1".to_string());
    settle().await;

    assert!(cancel.poll());
    assert_eq!(cancel.error().and_then(|e| e.status()), Some(503));
    assert_eq!(h.transport.calls("bookings/b1/cancel"), 1);
  }

  #[tokio::test]
  async fn test_on_success_sees_cache_before_invalidation() {
    let h = TestHarness::signed_in();
    h.transport.respond("favorites", json!([]));
    h.transport.respond(
      "POST favorites/p1/toggle",
      json!({ "propertyId": "p1", "favorited": true }),
    );
    h.client.fetch_query(&queries::favorites(), ()).await.unwrap();

    let cache = h.client.cache().clone();
    let key = queries::favorites().key(&());
    let saw_fresh = Arc::new(AtomicBool::new(false));
    let flag = saw_fresh.clone();

    let mut toggle = h
      .client
      .mutation(mutations::toggle_favorite())
      .with_on_success(move |_| {
        flag.store(!cache.is_stale(&key), Ordering::SeqCst);
      });
    toggle.mutate("p1".to_string());
    settle().await;
    toggle.poll();

    assert!(saw_fresh.load(Ordering::SeqCst));
    assert!(h.client.cache().is_stale(&queries::favorites().key(&())));
  }

  #[tokio::test]
  async fn test_reset_returns_to_idle() {
    let h = TestHarness::new();
    h.transport.fail("POST contact", 500);

    let mut contact = h.client.mutation(mutations::send_contact());
    contact.mutate(crate::api::types::ContactMessage {
      name: "Ada".into(),
      email: "ada@rentals.test".into(),
      message: "hi".into(),
    });
    settle().await;
    contact.poll();
    assert!(contact.error().is_some());

    contact.reset();
    assert!(matches!(contact.state(), MutationState::Idle));
    assert!(!contact.poll());
  }
}
