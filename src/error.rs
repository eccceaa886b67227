//! Error types for the remote API and local storage.

use thiserror::Error;

/// Failure of a remote call.
#[derive(Error, Debug)]
pub enum ApiError {
  /// The request never produced a response (connect, timeout, TLS).
  #[error("request to {path} failed: {message}")]
  Transport { path: String, message: String },

  /// The server answered with a non-success status.
  #[error("{path} returned {status}: {message}")]
  Status {
    path: String,
    status: u16,
    message: String,
  },

  /// The response body did not match the expected shape.
  #[error("failed to decode response from {path}: {source}")]
  Decode {
    path: String,
    #[source]
    source: serde_json::Error,
  },

  /// The request could not be built.
  #[error("invalid request: {0}")]
  InvalidRequest(String),
}

impl ApiError {
  /// Whether retrying the same request could succeed.
  ///
  /// Client errors are final except for timeouts and rate limiting.
  pub fn is_retryable(&self) -> bool {
    match self {
      ApiError::Transport { .. } => true,
      ApiError::Status { status, .. } => {
        !(400..500).contains(status) || *status == 408 || *status == 429
      }
      ApiError::Decode { .. } | ApiError::InvalidRequest(_) => false,
    }
  }

  /// HTTP status code, if the server answered.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }
}

/// Failure of the local key-value store.
#[derive(Error, Debug)]
pub enum StorageError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to prepare storage location: {0}")]
  Io(#[from] std::io::Error),

  #[error("storage lock poisoned")]
  LockPoisoned,
}
