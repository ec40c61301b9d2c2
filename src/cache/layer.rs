//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheResult, Cacheable, QueryKey};

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client,
/// providing transparent caching with offline support.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      stale_time: Duration::minutes(5),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Check if cached data is stale based on cached_at timestamp.
  fn is_stale(&self, cached_at: chrono::DateTime<Utc>) -> bool {
    Utc::now() - cached_at > self.stale_time
  }

  /// Fetch a list with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If stale/missing, fetch from network
  /// 3. On network failure, return stale cache (offline mode)
  /// 4. Update cache with new data
  pub async fn fetch_list<T, F, Fut>(
    &self,
    key: &dyn QueryKey,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    self.load_list(key, false, fetcher).await
  }

  /// Fetch a list from the network even when the cache is fresh.
  ///
  /// The cached result is still the offline fallback.
  pub async fn refresh_list<T, F, Fut>(
    &self,
    key: &dyn QueryKey,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    self.load_list(key, true, fetcher).await
  }

  async fn load_list<T, F, Fut>(
    &self,
    key: &dyn QueryKey,
    force: bool,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    let Some(cached) = self.storage.get_query_result::<T>(key)? else {
      // No cache, must fetch from network
      let data = fetcher().await?;
      self.storage.store_query_result(key, &data)?;
      return Ok(CacheResult::from_network(data));
    };

    if !force && !self.is_stale(cached.cached_at) {
      debug!(query = %key.description(), "Serving fresh cached result");
      return Ok(CacheResult::from_cache(cached.entities, cached.cached_at));
    }

    match fetcher().await {
      Ok(data) => {
        self.storage.store_query_result(key, &data)?;
        Ok(CacheResult::from_network(data))
      }
      Err(e) => {
        warn!(query = %key.description(), error = %e, "Network failed, serving cached result");
        Ok(CacheResult::offline(cached.entities, cached.cached_at))
      }
    }
  }

  /// Write confirmed entities back into a cached result, in place.
  pub fn write_through<T: Cacheable>(&self, key: &dyn QueryKey, entities: &[T]) -> Result<usize> {
    self.storage.update_query_entities(key, entities)
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      stale_time: self.stale_time,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteStorage;
  use crate::cache::CacheSource;
  use color_eyre::eyre::eyre;
  use serde::{Deserialize, Serialize};
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Row(u32);

  impl Cacheable for Row {
    fn cache_key(&self) -> String {
      self.0.to_string()
    }

    fn entity_type() -> &'static str {
      "row"
    }
  }

  struct Rows;

  impl QueryKey for Rows {
    fn cache_hash(&self) -> String {
      "rows".to_string()
    }

    fn description(&self) -> String {
      "all rows".to_string()
    }
  }

  fn layer() -> CacheLayer<SqliteStorage> {
    CacheLayer::new(SqliteStorage::open_in_memory().unwrap())
  }

  #[tokio::test]
  async fn test_miss_fetches_and_stores() {
    let cache = layer();
    let result = cache
      .fetch_list(&Rows, || async { Ok(vec![Row(1), Row(2)]) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, vec![Row(1), Row(2)]);
  }

  #[tokio::test]
  async fn test_fresh_hit_skips_network() {
    let cache = layer();
    cache
      .fetch_list(&Rows, || async { Ok(vec![Row(1)]) })
      .await
      .unwrap();

    let calls = AtomicU32::new(0);
    let result = cache
      .fetch_list(&Rows, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Row(99)])
      })
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data, vec![Row(1)]);
  }

  #[tokio::test]
  async fn test_refresh_bypasses_fresh_cache() {
    let cache = layer();
    cache
      .fetch_list(&Rows, || async { Ok(vec![Row(1)]) })
      .await
      .unwrap();

    let result = cache
      .refresh_list(&Rows, || async { Ok(vec![Row(2)]) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, vec![Row(2)]);

    // The refreshed data is what the next cache-first read sees
    let result = cache
      .fetch_list::<Row, _, _>(&Rows, || async { Err(eyre!("not called")) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data, vec![Row(2)]);
  }

  #[tokio::test]
  async fn test_refresh_falls_back_to_fresh_cache_offline() {
    let cache = layer();
    cache
      .fetch_list(&Rows, || async { Ok(vec![Row(1)]) })
      .await
      .unwrap();

    let result = cache
      .refresh_list::<Row, _, _>(&Rows, || async { Err(eyre!("connection refused")) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, vec![Row(1)]);
  }

  #[tokio::test]
  async fn test_stale_cache_refetches() {
    let cache = layer().with_stale_time(Duration::seconds(-1));
    cache
      .fetch_list(&Rows, || async { Ok(vec![Row(1)]) })
      .await
      .unwrap();

    let result = cache
      .fetch_list(&Rows, || async { Ok(vec![Row(2)]) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, vec![Row(2)]);
  }

  #[tokio::test]
  async fn test_stale_cache_served_offline() {
    let cache = layer().with_stale_time(Duration::seconds(-1));
    cache
      .fetch_list(&Rows, || async { Ok(vec![Row(1)]) })
      .await
      .unwrap();

    let result = cache
      .fetch_list::<Row, _, _>(&Rows, || async { Err(eyre!("connection refused")) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, vec![Row(1)]);
  }

  #[tokio::test]
  async fn test_miss_with_network_failure_is_error() {
    let cache = layer();
    let result = cache
      .fetch_list::<Row, _, _>(&Rows, || async { Err(eyre!("connection refused")) })
      .await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_write_through() {
    let cache = layer();
    cache
      .fetch_list(&Rows, || async { Ok(vec![Row(1), Row(2)]) })
      .await
      .unwrap();

    assert_eq!(cache.write_through(&Rows, &[Row(2)]).unwrap(), 1);
    assert_eq!(cache.write_through(&Rows, &[Row(3)]).unwrap(), 0);
  }
}
