//! Cache backend trait and its implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{Cacheable, CacheableUniqueCacheKey};

/// Asynchronous key-value store backing [`CacheableData`](super::CacheableData).
///
/// Values are addressed by `(T::cache_type(), key)`. Both operations may fail;
/// a missing value is `Ok(None)`, not an error. Implementations must be safe
/// to call concurrently for different keys.
#[async_trait]
pub trait CacheableDataCache: Send + Sync {
  /// Get a value, `None` on a miss.
  async fn get_value<T: Cacheable>(&self, key: &CacheableUniqueCacheKey) -> Result<Option<T>>;

  /// Store a value, replacing any previous one.
  async fn set_value<T: Cacheable>(&self, key: &CacheableUniqueCacheKey, value: &T) -> Result<()>;
}

/// Backend that doesn't cache anything.
/// Used when caching is disabled - every read misses and writes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl CacheableDataCache for NoopCache {
  async fn get_value<T: Cacheable>(&self, _key: &CacheableUniqueCacheKey) -> Result<Option<T>> {
    Ok(None) // Always miss
  }

  async fn set_value<T: Cacheable>(&self, _key: &CacheableUniqueCacheKey, _value: &T) -> Result<()> {
    Ok(()) // Discard
  }
}

/// Process-local backend holding serialized values in a map.
#[derive(Debug, Default)]
pub struct MemoryCache {
  values: Mutex<HashMap<(&'static str, CacheableUniqueCacheKey), serde_json::Value>>,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drop every stored value.
  pub fn clear(&self) -> Result<()> {
    self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .clear();
    Ok(())
  }

  /// Drop the value stored for `key`; returns whether one was present.
  pub fn remove<T: Cacheable>(&self, key: &CacheableUniqueCacheKey) -> Result<bool> {
    let removed = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .remove(&(T::cache_type(), key.clone()))
      .is_some();
    Ok(removed)
  }

  pub fn len(&self) -> usize {
    self.values.lock().map(|values| values.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl CacheableDataCache for MemoryCache {
  async fn get_value<T: Cacheable>(&self, key: &CacheableUniqueCacheKey) -> Result<Option<T>> {
    let stored = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .get(&(T::cache_type(), key.clone()))
      .cloned();

    match stored {
      Some(value) => {
        let value = serde_json::from_value(value)
          .map_err(|e| eyre!("Failed to deserialize cached value for {}: {}", key, e))?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  async fn set_value<T: Cacheable>(&self, key: &CacheableUniqueCacheKey, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)
      .map_err(|e| eyre!("Failed to serialize value for {}: {}", key, e))?;
    self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .insert((T::cache_type(), key.clone()), value);
    Ok(())
  }
}

/// SQLite-based cache backend.
pub struct SqliteCache {
  conn: Mutex<Connection>,
}

impl SqliteCache {
  /// Open the cache at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the cache database at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a private, non-persistent cache.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
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

    Ok(data_dir.join("crutch").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  /// When the value stored under `key` was last written.
  pub fn cached_at<T: Cacheable>(
    &self,
    key: &CacheableUniqueCacheKey,
  ) -> Result<Option<DateTime<Utc>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let cached_at: Option<String> = conn
      .query_row(
        "SELECT cached_at FROM cacheable_values WHERE value_type = ? AND key_hash = ?",
        params![T::cache_type(), key.storage_key()],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache timestamp for {}: {}", key, e))?;

    cached_at.as_deref().map(parse_datetime).transpose()
  }

  fn read<T: Cacheable>(&self, key: &CacheableUniqueCacheKey) -> Result<Option<T>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM cacheable_values WHERE value_type = ? AND key_hash = ?",
        params![T::cache_type(), key.storage_key()],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cached value for {}: {}", key, e))?;

    match data {
      Some(data) => {
        let value = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize cached value for {}: {}", key, e))?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  fn write<T: Cacheable>(&self, key: &CacheableUniqueCacheKey, value: &T) -> Result<()> {
    let data =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize value for {}: {}", key, e))?;

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cacheable_values (value_type, key_hash, main_key, sub_key, data, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![
          T::cache_type(),
          key.storage_key(),
          key.main_key,
          key.sub_key,
          data
        ],
      )
      .map_err(|e| eyre!("Failed to store value for {}: {}", key, e))?;

    Ok(())
  }
}

#[async_trait]
impl CacheableDataCache for SqliteCache {
  async fn get_value<T: Cacheable>(&self, key: &CacheableUniqueCacheKey) -> Result<Option<T>> {
    self.read(key)
  }

  async fn set_value<T: Cacheable>(&self, key: &CacheableUniqueCacheKey, value: &T) -> Result<()> {
    self.write(key, value)
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One serialized value per (value type, key)
CREATE TABLE IF NOT EXISTS cacheable_values (
    value_type TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    main_key TEXT NOT NULL,
    sub_key TEXT,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (value_type, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_cacheable_values_main_key
    ON cacheable_values(value_type, main_key);
"#;

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
