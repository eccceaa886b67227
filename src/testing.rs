//! Test doubles shared by the unit tests.

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{ApiClient, ApiRequest, Transport};
use crate::auth::{MemoryStore, TokenKey, TokenManager};
use crate::client::{ClientOptions, QueryClient};
use crate::error::ApiError;

#[derive(Debug, Clone)]
enum Reply {
  Json(Value),
  Status(u16, String),
}

/// Transport that answers from canned replies and records every request.
///
/// Routes are keyed by `"METHOD path"` or bare `"path"`. Queued replies are
/// consumed in order; the last one repeats.
#[derive(Default)]
pub struct MockTransport {
  routes: Mutex<HashMap<String, VecDeque<Reply>>>,
  requests: Mutex<Vec<ApiRequest>>,
  delay: Mutex<Option<Duration>>,
}

impl MockTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, route: &str, body: Value) {
    self.push(route, Reply::Json(body));
  }

  pub fn fail(&self, route: &str, status: u16) {
    self.push(route, Reply::Status(status, "mock failure".to_string()));
  }

  /// Hold every reply for `delay` before answering.
  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = Some(delay);
  }

  pub fn requests(&self) -> Vec<ApiRequest> {
    self.requests.lock().unwrap().clone()
  }

  /// Number of requests sent to `path`, any method.
  pub fn calls(&self, path: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.path == path)
      .count()
  }

  pub fn total_calls(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  fn push(&self, route: &str, reply: Reply) {
    self
      .routes
      .lock()
      .unwrap()
      .entry(route.to_string())
      .or_default()
      .push_back(reply);
  }

  fn next_reply(&self, request: &ApiRequest) -> Option<Reply> {
    let mut routes = self.routes.lock().unwrap();
    let with_method = format!("{} {}", request.method, request.path);
    let key = if routes.contains_key(&with_method) {
      with_method
    } else {
      request.path.clone()
    };
    let queue = routes.get_mut(&key)?;
    if queue.len() > 1 {
      queue.pop_front()
    } else {
      queue.front().cloned()
    }
  }
}

impl Transport for MockTransport {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>> {
    self.requests.lock().unwrap().push(request.clone());
    let reply = self.next_reply(&request);
    let delay = *self.delay.lock().unwrap();

    async move {
      if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
      }
      match reply {
        Some(Reply::Json(value)) => Ok(value),
        Some(Reply::Status(status, message)) => Err(ApiError::Status {
          path: request.path,
          status,
          message,
        }),
        None => Err(ApiError::Status {
          path: request.path,
          status: 404,
          message: "no mock route".to_string(),
        }),
      }
    }
    .boxed()
  }
}

/// A query client wired to in-memory storage and a mock transport.
pub struct TestHarness {
  pub transport: Arc<MockTransport>,
  pub store: Arc<MemoryStore>,
  pub tokens: TokenManager,
  pub client: QueryClient,
}

impl TestHarness {
  pub fn new() -> Self {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(MemoryStore::new());
    let tokens = TokenManager::new(store.clone());
    let options = ClientOptions {
      retry_base_delay: Duration::ZERO,
      ..ClientOptions::default()
    };
    let client = QueryClient::new(transport.clone(), tokens.clone(), options);

    Self {
      transport,
      store,
      tokens,
      client,
    }
  }

  pub fn signed_in() -> Self {
    let harness = Self::new();
    harness.tokens.set(TokenKey::Token, "test-token").unwrap();
    harness
  }

  pub fn api(&self) -> ApiClient {
    self.client.api().clone()
  }
}

/// Let spawned tasks make progress.
pub async fn settle() {
  for _ in 0..20 {
    tokio::task::yield_now().await;
  }
}

pub mod fixtures {
  use serde_json::{json, Value};

  pub fn property_json(id: &str, title: &str) -> Value {
    json!({
      "id": id,
      "title": title,
      "location": "Lisbon",
      "pricePerNight": 120.0,
      "maxGuests": 2
    })
  }

  pub fn review_json(id: &str, property_id: &str, rating: f64) -> Value {
    json!({
      "id": id,
      "propertyId": property_id,
      "userId": "u1",
      "overallRating": rating,
      "comment": "ok"
    })
  }

  pub fn blog_json(id: &str, slug: &str) -> Value {
    json!({
      "id": id,
      "slug": slug,
      "title": "Hello",
      "excerpt": "",
      "content": "..."
    })
  }

  pub fn profile_json() -> Value {
    json!({
      "id": "u1",
      "email": "guest@rentals.test",
      "firstName": "Ada",
      "lastName": "Lovelace",
      "role": "guest"
    })
  }

  pub fn auth_json(token: &str) -> Value {
    json!({ "token": token, "user": profile_json() })
  }
}
