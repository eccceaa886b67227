//! The single authority for reading and writing the client's auth token.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use super::storage::KeyValueStore;
use super::watch::TokenWatch;
use crate::error::StorageError;

/// Storage key names a token may live under.
///
/// All three are synonyms; older clients wrote different names.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TokenKey {
  #[default]
  Token,
  AccessToken,
  AuthToken,
}

impl TokenKey {
  /// Read order: first match wins.
  pub const ALL: [TokenKey; 3] = [TokenKey::Token, TokenKey::AccessToken, TokenKey::AuthToken];

  pub fn as_str(self) -> &'static str {
    match self {
      TokenKey::Token => "token",
      TokenKey::AccessToken => "accessToken",
      TokenKey::AuthToken => "authToken",
    }
  }

  pub fn from_storage_key(key: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.as_str() == key)
  }
}

impl fmt::Display for TokenKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Short, non-reversible tag for a token, safe to log.
pub fn fingerprint(token: &str) -> String {
  let digest = Sha256::digest(token.as_bytes());
  hex::encode(&digest[..6])
}

/// Reads and writes the auth token through an injected store.
///
/// Cheap to clone; all clones share the store.
#[derive(Clone)]
pub struct TokenManager {
  store: Arc<dyn KeyValueStore>,
}

impl TokenManager {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store }
  }

  /// The current token, checking every key variant in order.
  ///
  /// Empty values are treated as absent.
  pub fn get(&self) -> Result<Option<String>, StorageError> {
    for key in TokenKey::ALL {
      if let Some(token) = self.store.get(key.as_str())? {
        if !token.is_empty() {
          return Ok(Some(token));
        }
      }
    }
    Ok(None)
  }

  /// Like [`TokenManager::get`], but a storage failure reads as "no token".
  pub fn current(&self) -> Option<String> {
    match self.get() {
      Ok(token) => token,
      Err(e) => {
        warn!(error = %e, "failed to read auth token");
        None
      }
    }
  }

  pub fn has_token(&self) -> bool {
    self.current().is_some()
  }

  pub fn set(&self, key: TokenKey, token: &str) -> Result<(), StorageError> {
    self.store.set(key.as_str(), token)?;
    info!(key = %key, token = %fingerprint(token), "auth token stored");
    Ok(())
  }

  /// Remove the token under every key variant.
  pub fn clear(&self) -> Result<(), StorageError> {
    for key in TokenKey::ALL {
      self.store.remove(key.as_str())?;
    }
    info!("auth token cleared");
    Ok(())
  }

  pub fn store(&self) -> &Arc<dyn KeyValueStore> {
    &self.store
  }

  /// Reactive view of the token that follows every store change.
  pub fn watch(&self) -> TokenWatch {
    TokenWatch::spawn(self.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::storage::MemoryStore;

  fn manager() -> (Arc<MemoryStore>, TokenManager) {
    let store = Arc::new(MemoryStore::new());
    let manager = TokenManager::new(store.clone());
    (store, manager)
  }

  #[test]
  fn test_read_after_write_same_key() {
    let (_, tokens) = manager();
    tokens.set(TokenKey::Token, "abc").unwrap();
    assert_eq!(tokens.get().unwrap().as_deref(), Some("abc"));
  }

  #[test]
  fn test_read_resolves_any_variant() {
    let (_, tokens) = manager();
    tokens.set(TokenKey::AccessToken, "legacy").unwrap();
    assert_eq!(tokens.get().unwrap().as_deref(), Some("legacy"));

    let (_, tokens) = manager();
    tokens.set(TokenKey::AuthToken, "older").unwrap();
    assert_eq!(tokens.current().as_deref(), Some("older"));
  }

  #[test]
  fn test_first_match_wins() {
    let (store, tokens) = manager();
    store.set("authToken", "third").unwrap();
    store.set("accessToken", "second").unwrap();
    assert_eq!(tokens.current().as_deref(), Some("second"));

    store.set("token", "first").unwrap();
    assert_eq!(tokens.current().as_deref(), Some("first"));
  }

  #[test]
  fn test_empty_value_is_absent() {
    let (store, tokens) = manager();
    store.set("token", "").unwrap();
    store.set("authToken", "real").unwrap();
    assert_eq!(tokens.current().as_deref(), Some("real"));
  }

  #[test]
  fn test_clear_removes_all_variants() {
    let (store, tokens) = manager();
    store.set("token", "a").unwrap();
    store.set("accessToken", "b").unwrap();
    store.set("authToken", "c").unwrap();

    tokens.clear().unwrap();
    assert!(!tokens.has_token());
  }

  #[test]
  fn test_storage_key_lookup() {
    assert_eq!(TokenKey::from_storage_key("accessToken"), Some(TokenKey::AccessToken));
    assert_eq!(TokenKey::from_storage_key("theme"), None);
  }

  #[test]
  fn test_fingerprint_is_stable_and_short() {
    assert_eq!(fingerprint("secret"), fingerprint("secret"));
    assert_ne!(fingerprint("secret"), fingerprint("other"));
    assert_eq!(fingerprint("secret").len(), 12);
  }
}
