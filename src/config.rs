use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::TokenKey;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub auth: AuthConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Root of the rental service API, e.g. "https://rentals.example.com/api/"
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
  /// Key variant new tokens are written under
  #[serde(default)]
  pub token_key: TokenKey,
  /// How often the token store is checked for writes from other processes
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
}

impl Default for AuthConfig {
  fn default() -> Self {
    Self {
      token_key: TokenKey::default(),
      poll_interval_ms: default_poll_interval_ms(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long an unobserved entry survives before eviction
  #[serde(default = "default_gc_time_secs")]
  pub gc_time_secs: u64,
  /// First retry delay; doubles per attempt
  #[serde(default = "default_retry_base_delay_ms")]
  pub retry_base_delay_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      gc_time_secs: default_gc_time_secs(),
      retry_base_delay_ms: default_retry_base_delay_ms(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Token database location (defaults to the user data directory)
  pub path: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_poll_interval_ms() -> u64 {
  400
}

fn default_gc_time_secs() -> u64 {
  300
}

fn default_retry_base_delay_ms() -> u64 {
  1000
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./rentsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rentsync/config.yaml
  ///
  /// `RENTSYNC_API_URL` overrides `api.base_url` when set.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => match std::env::var("RENTSYNC_API_URL") {
        Ok(base_url) => Self::with_base_url(base_url),
        Err(_) => {
          return Err(eyre!(
            "No configuration file found. Create one at ~/.config/rentsync/config.yaml \
             or set RENTSYNC_API_URL."
          ))
        }
      },
    };

    if let Ok(base_url) = std::env::var("RENTSYNC_API_URL") {
      config.api.base_url = base_url;
    }

    Ok(config)
  }

  /// Configuration with defaults for everything but the API location.
  pub fn with_base_url(base_url: impl Into<String>) -> Self {
    Self {
      api: ApiConfig {
        base_url: base_url.into(),
        timeout_secs: default_timeout_secs(),
      },
      auth: AuthConfig::default(),
      cache: CacheConfig::default(),
      storage: StorageConfig::default(),
    }
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("rentsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("rentsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Directory for the token database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("rentsync"))
  }

  /// Resolved location of the token database.
  pub fn storage_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(path) => Ok(path.clone()),
      None => Ok(Self::data_dir()?.join("session.db")),
    }
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.auth.poll_interval_ms)
  }

  pub fn gc_time(&self) -> Duration {
    Duration::from_secs(self.cache.gc_time_secs)
  }

  pub fn retry_base_delay(&self) -> Duration {
    Duration::from_millis(self.cache.retry_base_delay_ms)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml("api:\n  base_url: https://rentals.test/api/\n").unwrap();

    assert_eq!(config.api.base_url, "https://rentals.test/api/");
    assert_eq!(config.timeout(), Duration::from_secs(30));
    assert_eq!(config.poll_interval(), Duration::from_millis(400));
    assert_eq!(config.gc_time(), Duration::from_secs(300));
    assert_eq!(config.auth.token_key, TokenKey::Token);
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  base_url: http://localhost:4000/
  timeout_secs: 5
auth:
  token_key: accessToken
  poll_interval_ms: 1000
cache:
  gc_time_secs: 60
  retry_base_delay_ms: 10
storage:
  path: /tmp/rentsync.db
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.auth.token_key, TokenKey::AccessToken);
    assert_eq!(config.poll_interval(), Duration::from_millis(1000));
    assert_eq!(config.retry_base_delay(), Duration::from_millis(10));
    assert_eq!(
      config.storage_path().unwrap(),
      PathBuf::from("/tmp/rentsync.db")
    );
  }

  #[test]
  fn test_missing_api_section_is_rejected() {
    assert!(Config::from_yaml("auth:\n  poll_interval_ms: 10\n").is_err());
  }
}
