//! User-facing notifications published by mutations.

use std::fmt;

/// Messages a mutation publishes when it settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
  pub success: &'static str,
  pub failure: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
  Success,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub level: NotificationLevel,
  pub message: String,
}

impl Notification {
  pub fn success(message: impl Into<String>) -> Self {
    Self {
      level: NotificationLevel::Success,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: NotificationLevel::Error,
      message: message.into(),
    }
  }
}

impl fmt::Display for Notification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.level {
      NotificationLevel::Success => write!(f, "✓ {}", self.message),
      NotificationLevel::Error => write!(f, "✗ {}", self.message),
    }
  }
}
