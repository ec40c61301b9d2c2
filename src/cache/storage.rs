//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{Cacheable, QueryKey};

/// Result of a cached query lookup.
#[derive(Debug, Clone)]
pub struct CachedQueryResult<T> {
  /// The cached entities in order
  pub entities: Vec<T>,
  /// When the query result was cached
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Store entities from a query result, replacing any previous result.
  fn store_query_result<T: Cacheable>(&self, key: &dyn QueryKey, entities: &[T]) -> Result<()>;

  /// Get cached entities for a query.
  fn get_query_result<T: Cacheable>(&self, key: &dyn QueryKey)
    -> Result<Option<CachedQueryResult<T>>>;

  /// Replace entities of an existing query result in place.
  ///
  /// Entities not already part of the result are ignored, order is kept.
  /// Returns how many entities were replaced.
  fn update_query_entities<T: Cacheable>(&self, key: &dyn QueryKey, entities: &[T])
    -> Result<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn store_query_result<T: Cacheable>(&self, _key: &dyn QueryKey, _entities: &[T]) -> Result<()> {
    Ok(()) // Discard
  }

  fn get_query_result<T: Cacheable>(
    &self,
    _key: &dyn QueryKey,
  ) -> Result<Option<CachedQueryResult<T>>> {
    Ok(None) // Always miss
  }

  fn update_query_entities<T: Cacheable>(
    &self,
    _key: &dyn QueryKey,
    _entities: &[T],
  ) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`, or at the default location.
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

    Self::with_connection(conn)
  }

  /// Open a throwaway in-memory database.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("itemview").join("cache.db"))
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
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Generic entity cache (stores serialized JSON)
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (entity_type, entity_key)
);

-- Query result tracking
CREATE TABLE IF NOT EXISTS query_cache (
    query_hash TEXT PRIMARY KEY,
    query_description TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    result_count INTEGER NOT NULL
);

-- Query to entity mapping (preserves order)
CREATE TABLE IF NOT EXISTS query_results (
    query_hash TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (query_hash, entity_key),
    FOREIGN KEY (query_hash) REFERENCES query_cache(query_hash) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_query_results_hash ON query_results(query_hash);
"#;

impl CacheStorage for SqliteStorage {
  fn store_query_result<T: Cacheable>(&self, key: &dyn QueryKey, entities: &[T]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let entity_type = T::entity_type();
    let query_hash = key.cache_hash();

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // Delete existing query results
    tx.execute(
      "DELETE FROM query_results WHERE query_hash = ?",
      params![query_hash],
    )
    .map_err(|e| eyre!("Failed to delete old query results: {}", e))?;

    tx.execute(
      "INSERT OR REPLACE INTO query_cache (query_hash, query_description, entity_type, cached_at, result_count)
       VALUES (?, ?, ?, datetime('now'), ?)",
      params![query_hash, key.description(), entity_type, entities.len()],
    )
    .map_err(|e| eyre!("Failed to update query cache: {}", e))?;

    for (position, entity) in entities.iter().enumerate() {
      let entity_key = entity.cache_key();
      let data =
        serde_json::to_vec(entity).map_err(|e| eyre!("Failed to serialize entity: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO entity_cache (entity_type, entity_key, data, cached_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![entity_type, entity_key, data],
      )
      .map_err(|e| eyre!("Failed to store entity: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO query_results (query_hash, entity_key, position)
         VALUES (?, ?, ?)",
        params![query_hash, entity_key, position],
      )
      .map_err(|e| eyre!("Failed to store query result: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get_query_result<T: Cacheable>(
    &self,
    key: &dyn QueryKey,
  ) -> Result<Option<CachedQueryResult<T>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let entity_type = T::entity_type();
    let query_hash = key.cache_hash();

    let cached_at_str: Option<String> = conn
      .query_row(
        "SELECT cached_at FROM query_cache WHERE query_hash = ? AND entity_type = ?",
        params![query_hash, entity_type],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read query cache: {}", e))?;

    let Some(cached_at_str) = cached_at_str else {
      return Ok(None);
    };
    let cached_at = parse_datetime(&cached_at_str)?;

    // Get entities in order
    let mut stmt = conn
      .prepare(
        "SELECT ec.data FROM entity_cache ec
         INNER JOIN query_results qr ON ec.entity_type = ? AND ec.entity_key = qr.entity_key
         WHERE qr.query_hash = ?
         ORDER BY qr.position",
      )
      .map_err(|e| eyre!("Failed to prepare entity query: {}", e))?;

    let entities: Vec<T> = stmt
      .query_map(params![entity_type, query_hash], |row| {
        let data: Vec<u8> = row.get(0)?;
        Ok(data)
      })
      .map_err(|e| eyre!("Failed to query entities: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|data| serde_json::from_slice(&data).ok())
      .collect();

    Ok(Some(CachedQueryResult {
      entities,
      cached_at,
    }))
  }

  fn update_query_entities<T: Cacheable>(
    &self,
    key: &dyn QueryKey,
    entities: &[T],
  ) -> Result<usize> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let entity_type = T::entity_type();
    let query_hash = key.cache_hash();

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let mut replaced = 0;
    for entity in entities {
      let entity_key = entity.cache_key();

      // Only entities that are already part of this result
      let member: Option<i64> = tx
        .query_row(
          "SELECT position FROM query_results WHERE query_hash = ? AND entity_key = ?",
          params![query_hash, entity_key],
          |row| row.get(0),
        )
        .optional()
        .map_err(|e| eyre!("Failed to look up cached entity: {}", e))?;
      if member.is_none() {
        continue;
      }

      let data =
        serde_json::to_vec(entity).map_err(|e| eyre!("Failed to serialize entity: {}", e))?;
      tx.execute(
        "UPDATE entity_cache SET data = ?, cached_at = datetime('now')
         WHERE entity_type = ? AND entity_key = ?",
        params![data, entity_type, entity_key],
      )
      .map_err(|e| eyre!("Failed to update entity: {}", e))?;
      replaced += 1;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(replaced)
  }
}

/// Storage chosen at runtime from configuration.
pub enum ConfiguredStorage {
  Sqlite(SqliteStorage),
  Disabled(NoopStorage),
}

impl CacheStorage for ConfiguredStorage {
  fn store_query_result<T: Cacheable>(&self, key: &dyn QueryKey, entities: &[T]) -> Result<()> {
    match self {
      Self::Sqlite(s) => s.store_query_result(key, entities),
      Self::Disabled(s) => s.store_query_result(key, entities),
    }
  }

  fn get_query_result<T: Cacheable>(
    &self,
    key: &dyn QueryKey,
  ) -> Result<Option<CachedQueryResult<T>>> {
    match self {
      Self::Sqlite(s) => s.get_query_result(key),
      Self::Disabled(s) => s.get_query_result(key),
    }
  }

  fn update_query_entities<T: Cacheable>(
    &self,
    key: &dyn QueryKey,
    entities: &[T],
  ) -> Result<usize> {
    match self {
      Self::Sqlite(s) => s.update_query_entities(key, entities),
      Self::Disabled(s) => s.update_query_entities(key, entities),
    }
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Thing {
    id: u32,
    label: String,
  }

  impl Cacheable for Thing {
    fn cache_key(&self) -> String {
      self.id.to_string()
    }

    fn entity_type() -> &'static str {
      "thing"
    }
  }

  struct Key(&'static str);

  impl QueryKey for Key {
    fn cache_hash(&self) -> String {
      self.0.to_string()
    }

    fn description(&self) -> String {
      format!("things: {}", self.0)
    }
  }

  fn thing(id: u32, label: &str) -> Thing {
    Thing {
      id,
      label: label.to_string(),
    }
  }

  #[test]
  fn test_store_and_get_preserves_order() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let things = vec![thing(3, "c"), thing(1, "a"), thing(2, "b")];
    storage.store_query_result(&Key("all"), &things).unwrap();

    let cached = storage
      .get_query_result::<Thing>(&Key("all"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.entities, things);
  }

  #[test]
  fn test_get_missing_query() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert!(storage
      .get_query_result::<Thing>(&Key("nope"))
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_store_replaces_previous_result() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .store_query_result(&Key("all"), &[thing(1, "a"), thing(2, "b")])
      .unwrap();
    storage
      .store_query_result(&Key("all"), &[thing(2, "b2")])
      .unwrap();

    let cached = storage
      .get_query_result::<Thing>(&Key("all"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.entities, vec![thing(2, "b2")]);
  }

  #[test]
  fn test_update_entities_in_place_only() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .store_query_result(&Key("all"), &[thing(1, "a"), thing(2, "b")])
      .unwrap();

    let replaced = storage
      .update_query_entities(&Key("all"), &[thing(2, "B!"), thing(9, "new")])
      .unwrap();
    assert_eq!(replaced, 1);

    let cached = storage
      .get_query_result::<Thing>(&Key("all"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.entities, vec![thing(1, "a"), thing(2, "B!")]);
  }

  #[test]
  fn test_open_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    {
      let storage = SqliteStorage::open(Some(&path)).unwrap();
      storage
        .store_query_result(&Key("all"), &[thing(1, "a")])
        .unwrap();
    }

    let reopened = SqliteStorage::open(Some(&path)).unwrap();
    let cached = reopened
      .get_query_result::<Thing>(&Key("all"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.entities, vec![thing(1, "a")]);
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    storage
      .store_query_result(&Key("all"), &[thing(1, "a")])
      .unwrap();
    assert!(storage
      .get_query_result::<Thing>(&Key("all"))
      .unwrap()
      .is_none());
  }
}
