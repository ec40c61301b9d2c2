//! Items client with an optional persistent snapshot of the item list.

use chrono::Duration;
use color_eyre::Result;
use tracing::{debug, warn};

use crate::cache::{CacheLayer, CacheResult, ConfiguredStorage, NoopStorage, SqliteStorage};
use crate::config::Config;

use super::cache::ItemQueryKey;
use super::client::ItemsClient;
use super::types::{Item, ItemId, ItemPatch};

/// Items client with transparent list caching.
///
/// This wraps the underlying ItemsClient and provides the same API. With
/// `cache.persist` off the storage is a no-op and every call goes to the
/// network.
#[derive(Clone)]
pub struct CachedItemsClient {
  inner: ItemsClient,
  cache: CacheLayer<ConfiguredStorage>,
  list_key: ItemQueryKey,
}

impl CachedItemsClient {
  pub fn new(config: &Config) -> Result<Self> {
    let inner = ItemsClient::new(config)?;
    let storage = if config.cache.persist {
      ConfiguredStorage::Sqlite(SqliteStorage::open(config.cache.path.as_deref())?)
    } else {
      ConfiguredStorage::Disabled(NoopStorage)
    };
    Ok(Self::with_storage(inner, storage, config.cache.stale_secs))
  }

  pub fn with_storage(inner: ItemsClient, storage: ConfiguredStorage, stale_secs: i64) -> Self {
    let list_key = ItemQueryKey::ItemList {
      base_url: inner.base_url().to_string(),
    };
    let cache = CacheLayer::new(storage).with_stale_time(Duration::seconds(stale_secs));

    Self {
      inner,
      cache,
      list_key,
    }
  }

  pub fn base_url(&self) -> &url::Url {
    self.inner.base_url()
  }

  /// Get the item list, from the snapshot when it is fresh enough.
  pub async fn list_items(&self) -> Result<CacheResult<Vec<Item>>> {
    self
      .cache
      .fetch_list(&self.list_key, || {
        let inner = self.inner.clone();
        async move { inner.list_items().await }
      })
      .await
  }

  /// Get the item list from the network, ignoring a fresh snapshot.
  ///
  /// Falls back to the snapshot when the network is unreachable.
  pub async fn refresh_items(&self) -> Result<CacheResult<Vec<Item>>> {
    self
      .cache
      .refresh_list(&self.list_key, || {
        let inner = self.inner.clone();
        async move { inner.list_items().await }
      })
      .await
  }

  /// Update an item (write operation, result written through to the snapshot).
  pub async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<Item> {
    let item = self.inner.update_item(id, patch).await?;

    match self
      .cache
      .write_through(&self.list_key, std::slice::from_ref(&item))
    {
      Ok(replaced) => debug!(id, replaced, "Wrote confirmed item to snapshot"),
      Err(e) => warn!(id, error = %e, "Failed to write confirmed item to snapshot"),
    }

    Ok(item)
  }
}
