//! Persistent key/value store backing the response caches.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for cache storage backends.
///
/// Values are opaque strings (JSON documents written by the caches). The
/// store has no notion of expiry; callers decide when an entry is stale.
pub trait KeyValueStore: Send + Sync {
  /// Get the raw value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Delete the entry under `key` if present.
  fn remove(&self, key: &str) -> Result<()>;

  /// Read-modify-write `key` without another writer interleaving.
  ///
  /// `f` receives the current value and returns the value to store, or
  /// `None` to leave the entry untouched.
  fn update(&self, key: &str, f: &mut dyn FnMut(Option<String>) -> Option<String>) -> Result<()>;

  /// All keys starting with `prefix`, in key order.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

  /// Delete every entry whose key starts with `prefix`. Returns the count.
  fn remove_prefix(&self, prefix: &str) -> Result<usize> {
    let keys = self.keys_with_prefix(prefix)?;
    for key in &keys {
      self.remove(key)?;
    }
    Ok(keys.len())
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl KeyValueStore for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<String>> {
    Ok(None)
  }

  fn set(&self, _key: &str, _value: &str) -> Result<()> {
    Ok(())
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn update(
    &self,
    _key: &str,
    _f: &mut dyn FnMut(Option<String>) -> Option<String>,
  ) -> Result<()> {
    Ok(())
  }

  fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
    Ok(Vec::new())
  }
}

/// In-process store, used for `--no-cache` sessions and tests.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
    self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl KeyValueStore for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self.lock()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.lock()?.remove(key);
    Ok(())
  }

  fn update(&self, key: &str, f: &mut dyn FnMut(Option<String>) -> Option<String>) -> Result<()> {
    let mut entries = self.lock()?;
    if let Some(value) = f(entries.get(key).cloned()) {
      entries.insert(key.to_string(), value);
    }
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    Ok(
      self
        .lock()?
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect(),
    )
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the store at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    tracing::debug!(path = %path.display(), "opened cache database");
    Self::from_connection(conn)
  }

  /// Open a throwaway database in memory.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("selstats").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
  conn
    .query_row(
      "SELECT value FROM kv_cache WHERE key = ?",
      params![key],
      |row| row.get(0),
    )
    .optional()
    .map_err(|e| eyre!("Failed to read cache entry {}: {}", key, e))
}

fn write_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR REPLACE INTO kv_cache (key, value, written_at) VALUES (?, ?, datetime('now'))",
      params![key, value],
    )
    .map_err(|e| eyre!("Failed to write cache entry {}: {}", key, e))?;
  Ok(())
}

impl KeyValueStore for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    read_value(&conn, key)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;
    write_value(&conn, key, value)
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM kv_cache WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete cache entry {}: {}", key, e))?;
    Ok(())
  }

  fn update(&self, key: &str, f: &mut dyn FnMut(Option<String>) -> Option<String>) -> Result<()> {
    // The connection mutex serializes writers within the process.
    let conn = self.lock()?;
    let current = read_value(&conn, key)?;
    if let Some(value) = f(current) {
      write_value(&conn, key, &value)?;
    }
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT key FROM kv_cache WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare key query: {}", e))?;

    let keys = stmt
      .query_map(params![prefix], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to list cache keys: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exercise(store: &dyn KeyValueStore) {
    assert_eq!(store.get("cache:/a").unwrap(), None);

    store.set("cache:/a", "1").unwrap();
    store.set("cache:/b", "2").unwrap();
    store.set("seasonCache:/a|", "3").unwrap();
    assert_eq!(store.get("cache:/a").unwrap().as_deref(), Some("1"));

    store.set("cache:/a", "10").unwrap();
    assert_eq!(store.get("cache:/a").unwrap().as_deref(), Some("10"));

    assert_eq!(
      store.keys_with_prefix("cache:").unwrap(),
      vec!["cache:/a".to_string(), "cache:/b".to_string()]
    );

    store
      .update("cache:/b", &mut |current| {
        Some(format!("{}+", current.unwrap_or_default()))
      })
      .unwrap();
    assert_eq!(store.get("cache:/b").unwrap().as_deref(), Some("2+"));

    store.update("cache:/b", &mut |_| None).unwrap();
    assert_eq!(store.get("cache:/b").unwrap().as_deref(), Some("2+"));

    store.remove("cache:/a").unwrap();
    assert_eq!(store.get("cache:/a").unwrap(), None);

    assert_eq!(store.remove_prefix("seasonCache:").unwrap(), 1);
    assert!(store.keys_with_prefix("seasonCache:").unwrap().is_empty());
  }

  #[test]
  fn test_memory_storage() {
    exercise(&MemoryStorage::new());
  }

  #[test]
  fn test_sqlite_storage() {
    exercise(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_prefix_is_not_a_like_pattern() {
    let store = SqliteStorage::open_in_memory().unwrap();
    store.set("cache:/api/sel_stats", "1").unwrap();
    store.set("cache:/api/selXstats", "2").unwrap();
    assert_eq!(
      store.keys_with_prefix("cache:/api/sel_").unwrap(),
      vec!["cache:/api/sel_stats".to_string()]
    );
  }

  #[test]
  fn test_noop_storage_never_stores() {
    let store = NoopStorage;
    store.set("k", "v").unwrap();
    assert_eq!(store.get("k").unwrap(), None);
    let mut called = false;
    store
      .update("k", &mut |_| {
        called = true;
        Some("v".to_string())
      })
      .unwrap();
    // Nothing is stored, so there is nothing to merge into
    assert!(!called);
    assert_eq!(store.get("k").unwrap(), None);
  }
}
