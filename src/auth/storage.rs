//! Key-value storage for session state, with change notification.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StorageError;

const EVENT_CAPACITY: usize = 64;

/// Where a storage change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOrigin {
  /// Written through this store instance
  Local,
  /// Written by another process sharing the same backing store
  External,
}

/// A single key change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
  pub key: String,
  pub old_value: Option<String>,
  pub new_value: Option<String>,
  pub origin: StorageOrigin,
}

/// Durable client storage for small string values.
///
/// Reads are synchronous and local; every write publishes a [`StorageEvent`]
/// to subscribers.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

  fn remove(&self, key: &str) -> Result<(), StorageError>;

  fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

/// In-process store, used for tests and embedding.
pub struct MemoryStore {
  values: RwLock<HashMap<String, String>>,
  events: broadcast::Sender<StorageEvent>,
}

impl MemoryStore {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      values: RwLock::new(HashMap::new()),
      events,
    }
  }

  /// Apply a change as if another process had made it.
  pub fn apply_external(&self, key: &str, value: Option<&str>) -> Result<(), StorageError> {
    self.write(key, value.map(String::from), StorageOrigin::External)
  }

  fn write(
    &self,
    key: &str,
    value: Option<String>,
    origin: StorageOrigin,
  ) -> Result<(), StorageError> {
    let old_value = {
      let mut values = self.values.write().map_err(|_| StorageError::LockPoisoned)?;
      match &value {
        Some(v) => values.insert(key.to_string(), v.clone()),
        None => values.remove(key),
      }
    };

    // No receivers is fine
    let _ = self.events.send(StorageEvent {
      key: key.to_string(),
      old_value,
      new_value: value,
      origin,
    });
    Ok(())
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let values = self.values.read().map_err(|_| StorageError::LockPoisoned)?;
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.write(key, Some(value.to_string()), StorageOrigin::Local)
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    self.write(key, None, StorageOrigin::Local)
  }

  fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
    self.events.subscribe()
  }
}

/// Schema for the key-value table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed store shared between processes.
///
/// Local writes are published immediately. Writes made by other connections
/// to the same file are picked up by [`SqliteStore::check_external_changes`],
/// which [`SqliteStore::spawn_external_watch`] runs on an interval.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  events: broadcast::Sender<StorageEvent>,
  /// Last contents seen by this instance, used to diff external writes
  snapshot: Mutex<Snapshot>,
}

#[derive(Default)]
struct Snapshot {
  data_version: i64,
  values: HashMap<String, String>,
}

impl SqliteStore {
  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(2))?;
    Self::from_connection(conn)
  }

  /// Store backed by a private in-memory database.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StorageError> {
    conn.execute_batch(STORE_SCHEMA)?;

    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let store = Self {
      conn: Mutex::new(conn),
      events,
      snapshot: Mutex::new(Snapshot::default()),
    };

    let conn = store.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
    let snapshot = Snapshot {
      data_version: data_version(&conn)?,
      values: load_all(&conn)?,
    };
    drop(conn);
    *store.snapshot.lock().map_err(|_| StorageError::LockPoisoned)? = snapshot;

    Ok(store)
  }

  /// Publish changes committed by other connections since the last check.
  ///
  /// Returns the number of keys that changed.
  pub fn check_external_changes(&self) -> Result<usize, StorageError> {
    let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
    let mut snapshot = self.snapshot.lock().map_err(|_| StorageError::LockPoisoned)?;

    let version = data_version(&conn)?;
    if version == snapshot.data_version {
      return Ok(0);
    }

    let current = load_all(&conn)?;
    drop(conn);

    let mut changed = Vec::new();
    for (key, value) in &current {
      if snapshot.values.get(key) != Some(value) {
        changed.push((key.clone(), snapshot.values.get(key).cloned(), Some(value.clone())));
      }
    }
    for (key, value) in &snapshot.values {
      if !current.contains_key(key) {
        changed.push((key.clone(), Some(value.clone()), None));
      }
    }

    snapshot.data_version = version;
    snapshot.values = current;
    drop(snapshot);

    let count = changed.len();
    for (key, old_value, new_value) in changed {
      debug!(key = %key, "external storage change");
      let _ = self.events.send(StorageEvent {
        key,
        old_value,
        new_value,
        origin: StorageOrigin::External,
      });
    }

    Ok(count)
  }

  /// Check for external writes every `interval` until the store is dropped.
  pub fn spawn_external_watch(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
    let store: Weak<Self> = Arc::downgrade(self);

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

      loop {
        ticker.tick().await;

        let Some(store) = store.upgrade() else {
          break;
        };
        if let Err(e) = store.check_external_changes() {
          warn!(error = %e, "failed to check storage for external changes");
        }
      }
    })
  }

  fn write(&self, key: &str, value: Option<&str>) -> Result<(), StorageError> {
    let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;

    match value {
      Some(v) => conn.execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, v],
      )?,
      None => conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?,
    };
    drop(conn);

    let old_value = {
      let mut snapshot = self.snapshot.lock().map_err(|_| StorageError::LockPoisoned)?;
      match value {
        Some(v) => snapshot.values.insert(key.to_string(), v.to_string()),
        None => snapshot.values.remove(key),
      }
    };

    let _ = self.events.send(StorageEvent {
      key: key.to_string(),
      old_value,
      new_value: value.map(String::from),
      origin: StorageOrigin::Local,
    });
    Ok(())
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;

    let value = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;

    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.write(key, Some(value))
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    self.write(key, None)
  }

  fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
    self.events.subscribe()
  }
}

fn data_version(conn: &Connection) -> Result<i64, StorageError> {
  Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

fn load_all(conn: &Connection) -> Result<HashMap<String, String>, StorageError> {
  let mut stmt = conn.prepare("SELECT key, value FROM kv_store")?;
  let rows = stmt
    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
    .collect::<Result<HashMap<String, String>, _>>()?;
  Ok(rows)
}
