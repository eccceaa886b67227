//! Session state reported by the external OAuth provider.

use serde::{Deserialize, Serialize};

use crate::api::types::OAuthIdentity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
  #[default]
  Loading,
  Authenticated,
  Unauthenticated,
}

/// User as the provider describes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
  pub email: Option<String>,
  pub image: Option<String>,
  /// Display name, "First Last"
  pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSession {
  pub status: SessionStatus,
  pub user: Option<SessionUser>,
}

impl OAuthSession {
  pub fn loading() -> Self {
    Self::default()
  }

  pub fn unauthenticated() -> Self {
    Self {
      status: SessionStatus::Unauthenticated,
      user: None,
    }
  }

  pub fn authenticated(user: SessionUser) -> Self {
    Self {
      status: SessionStatus::Authenticated,
      user: Some(user),
    }
  }

  pub fn is_authenticated(&self) -> bool {
    self.status == SessionStatus::Authenticated && self.user.is_some()
  }

  /// Identity to exchange for an API token. Needs an email.
  pub fn identity(&self) -> Option<OAuthIdentity> {
    let user = self.user.as_ref()?;
    let email = user.email.as_deref().filter(|e| !e.trim().is_empty())?;
    let (first_name, last_name) = split_name(user.name.as_deref().unwrap_or_default());

    Some(OAuthIdentity {
      email: email.to_string(),
      avatar: user.image.clone(),
      first_name: first_name.to_string(),
      last_name: last_name.to_string(),
    })
  }
}

/// Split a display name at its first run of whitespace.
pub fn split_name(name: &str) -> (&str, &str) {
  let name = name.trim();
  match name.split_once(char::is_whitespace) {
    Some((first, rest)) => (first, rest.trim_start()),
    None => (name, ""),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_split_name() {
    assert_eq!(split_name("Ada Lovelace"), ("Ada", "Lovelace"));
    assert_eq!(split_name("  Ada   King Lovelace "), ("Ada", "King Lovelace"));
    assert_eq!(split_name("Cher"), ("Cher", ""));
    assert_eq!(split_name(""), ("", ""));
  }

  #[test]
  fn test_identity_from_session() {
    let session = OAuthSession::authenticated(SessionUser {
      email: Some("a@b.com".into()),
      image: Some("https://img.test/a.png".into()),
      name: Some("Ada Lovelace".into()),
    });

    let identity = session.identity().unwrap();
    assert_eq!(identity.email, "a@b.com");
    assert_eq!(identity.avatar.as_deref(), Some("https://img.test/a.png"));
    assert_eq!(identity.first_name, "Ada");
    assert_eq!(identity.last_name, "Lovelace");
  }

  #[test]
  fn test_identity_needs_email() {
    let session = OAuthSession::authenticated(SessionUser {
      name: Some("No Mail".into()),
      ..Default::default()
    });
    assert!(session.is_authenticated());
    assert!(session.identity().is_none());
    assert!(OAuthSession::unauthenticated().identity().is_none());
  }

  #[test]
  fn test_status_wire_format() {
    let session: OAuthSession =
      serde_json::from_str(r#"{"status":"authenticated","user":{"email":"a@b.com"}}"#).unwrap();
    assert!(session.is_authenticated());
    assert_eq!(
      serde_json::to_string(&SessionStatus::Unauthenticated).unwrap(),
      "\"unauthenticated\""
    );
  }
}
