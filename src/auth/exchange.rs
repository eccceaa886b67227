//! Trading an OAuth session for an API token.
//!
//! When the provider reports an authenticated user and no token is stored
//! locally, the provider identity is sent through the `oauth-exchange`
//! mutation and the returned token is persisted. A failed exchange is logged
//! and not retried for the same identity; the client stays tokenless until a
//! manual sign-in.

use std::collections::HashSet;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session::OAuthSession;
use super::token::fingerprint;
use crate::client::QueryClient;
use crate::registry::mutations;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
  /// Unauthenticated, or already holding a token
  Idle,
  InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
  /// Nothing to do for this session
  Skipped,
  /// Token stored; carries its fingerprint
  Exchanged(String),
  Failed,
}

pub struct TokenExchange {
  client: QueryClient,
  state: ExchangeState,
  /// Emails whose exchange already failed
  failed: HashSet<String>,
}

impl TokenExchange {
  pub fn new(client: QueryClient) -> Self {
    Self {
      client,
      state: ExchangeState::Idle,
      failed: HashSet::new(),
    }
  }

  pub fn state(&self) -> ExchangeState {
    self.state
  }

  pub fn should_exchange(&self, session: &OAuthSession) -> bool {
    if self.state == ExchangeState::InFlight || !session.is_authenticated() {
      return false;
    }
    let Some(identity) = session.identity() else {
      return false;
    };
    !self.failed.contains(&identity.email) && !self.client.tokens().has_token()
  }

  /// React to one session snapshot.
  pub async fn handle(&mut self, session: &OAuthSession) -> ExchangeOutcome {
    if !self.should_exchange(session) {
      return ExchangeOutcome::Skipped;
    }
    let Some(identity) = session.identity() else {
      return ExchangeOutcome::Skipped;
    };

    let email = identity.email.clone();
    self.state = ExchangeState::InFlight;
    debug!("exchanging oauth session for api token");

    let client = &self.client;
    let result = client
      .mutate_with(&mutations::oauth_exchange(), identity, |response| {
        client.store_token(&response.token)
      })
      .await;
    self.state = ExchangeState::Idle;

    match result {
      Ok(response) => {
        let tag = fingerprint(&response.token);
        info!(token = %tag, "oauth session exchanged");
        ExchangeOutcome::Exchanged(tag)
      }
      Err(e) => {
        warn!(error = %e, "oauth token exchange failed, staying signed out");
        self.failed.insert(email);
        ExchangeOutcome::Failed
      }
    }
  }

  /// Follow session changes until the sender is dropped.
  pub async fn run(mut self, mut sessions: watch::Receiver<OAuthSession>) {
    loop {
      let session = sessions.borrow_and_update().clone();
      self.handle(&session).await;
      if sessions.changed().await.is_err() {
        debug!("session channel closed");
        break;
      }
    }
  }

  pub fn spawn(self, sessions: watch::Receiver<OAuthSession>) -> JoinHandle<()> {
    tokio::spawn(self.run(sessions))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::session::SessionUser;
  use crate::auth::{KeyValueStore, TokenKey};
  use crate::testing::{fixtures, settle, TestHarness};

  fn session(email: &str) -> OAuthSession {
    OAuthSession::authenticated(SessionUser {
      email: Some(email.into()),
      image: None,
      name: Some("Ada Lovelace".into()),
    })
  }

  #[tokio::test]
  async fn test_authenticated_without_token_exchanges_once() {
    let h = TestHarness::new();
    h.transport.respond("POST auth/oauth", fixtures::auth_json("oauth-token"));
    let mut exchange = TokenExchange::new(h.client.clone());

    let outcome = exchange.handle(&session("a@b.com")).await;
    assert_eq!(outcome, ExchangeOutcome::Exchanged(fingerprint("oauth-token")));
    assert_eq!(h.tokens.current().as_deref(), Some("oauth-token"));

    // now synced
    assert_eq!(exchange.handle(&session("a@b.com")).await, ExchangeOutcome::Skipped);
    assert_eq!(h.transport.calls("auth/oauth"), 1);

    let body = h.transport.requests()[0].body.clone().unwrap();
    assert_eq!(body["email"], "a@b.com");
    assert_eq!(body["firstName"], "Ada");
    assert_eq!(body["lastName"], "Lovelace");
  }

  #[tokio::test]
  async fn test_existing_token_skips_exchange() {
    let h = TestHarness::signed_in();
    let mut exchange = TokenExchange::new(h.client.clone());

    assert_eq!(exchange.handle(&session("a@b.com")).await, ExchangeOutcome::Skipped);
    assert_eq!(h.transport.total_calls(), 0);
  }

  #[tokio::test]
  async fn test_unauthenticated_or_loading_skips() {
    let h = TestHarness::new();
    let mut exchange = TokenExchange::new(h.client.clone());

    assert!(!exchange.should_exchange(&OAuthSession::loading()));
    assert!(!exchange.should_exchange(&OAuthSession::unauthenticated()));
    exchange.handle(&OAuthSession::unauthenticated()).await;
    assert_eq!(h.transport.total_calls(), 0);
  }

  #[tokio::test]
  async fn test_failure_stays_tokenless_without_retry() {
    let h = TestHarness::new();
    h.transport.fail("POST auth/oauth", 500);
    let mut exchange = TokenExchange::new(h.client.clone());

    assert_eq!(exchange.handle(&session("a@b.com")).await, ExchangeOutcome::Failed);
    assert_eq!(exchange.state(), ExchangeState::Idle);
    assert!(!h.tokens.has_token());

    assert_eq!(exchange.handle(&session("a@b.com")).await, ExchangeOutcome::Skipped);
    assert_eq!(h.transport.calls("auth/oauth"), 1);
  }

  #[tokio::test]
  async fn test_token_stored_under_configured_key() {
    let h = TestHarness::new();
    h.transport.respond("POST auth/oauth", fixtures::auth_json("oauth-token"));
    let client = QueryClient::new(
      h.transport.clone(),
      h.tokens.clone(),
      crate::client::ClientOptions {
        token_key: TokenKey::AuthToken,
        ..Default::default()
      },
    );

    TokenExchange::new(client).handle(&session("a@b.com")).await;

    assert_eq!(h.store.get("authToken").unwrap().as_deref(), Some("oauth-token"));
    assert_eq!(h.store.get("token").unwrap(), None);
  }

  #[tokio::test]
  async fn test_run_follows_session_channel() {
    let h = TestHarness::new();
    h.transport.respond("POST auth/oauth", fixtures::auth_json("oauth-token"));
    let (tx, rx) = watch::channel(OAuthSession::loading());

    let task = TokenExchange::new(h.client.clone()).spawn(rx);
    settle().await;
    assert_eq!(h.transport.total_calls(), 0);

    tx.send(session("a@b.com")).unwrap();
    settle().await;
    assert_eq!(h.tokens.current().as_deref(), Some("oauth-token"));

    drop(tx);
    task.await.unwrap();
    assert_eq!(h.transport.calls("auth/oauth"), 1);
  }
}
