//! Caching implementations for item types.

use sha2::{Digest, Sha256};

use crate::cache::{Cacheable, QueryKey};

use super::types::Item;

impl Cacheable for Item {
  fn cache_key(&self) -> String {
    self.id.to_string()
  }

  fn entity_type() -> &'static str {
    "item"
  }
}

/// Query key types for item API calls.
#[derive(Clone, Debug)]
pub enum ItemQueryKey {
  /// `GET /api/items` against a given API base URL
  ItemList { base_url: String },
}

impl QueryKey for ItemQueryKey {
  fn cache_hash(&self) -> String {
    let input = match self {
      Self::ItemList { base_url } => format!("item_list:{}", normalize_url(base_url)),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    match self {
      Self::ItemList { base_url } => format!("items at {}", base_url),
    }
  }
}

/// Normalize a base URL so trailing slashes and case don't split the cache.
fn normalize_url(url: &str) -> String {
  url.trim().trim_end_matches('/').to_lowercase()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn list_key(base_url: &str) -> ItemQueryKey {
    ItemQueryKey::ItemList {
      base_url: base_url.to_string(),
    }
  }

  #[test]
  fn test_hash_is_stable_and_normalized() {
    let a = list_key("http://Items.test/").cache_hash();
    let b = list_key("http://items.test").cache_hash();
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
  }

  #[test]
  fn test_hash_differs_per_server() {
    assert_ne!(
      list_key("http://one.test").cache_hash(),
      list_key("http://two.test").cache_hash()
    );
  }

  #[test]
  fn test_item_cache_key() {
    assert_eq!(Item::new(42, "x").cache_key(), "42");
  }
}
