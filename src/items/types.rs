use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable identifier of an item
pub type ItemId = i64;

/// An item as served by `GET /api/items`.
///
/// Fields the client doesn't know about are kept in `extra` so a merge
/// never drops server data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
  pub id: ItemId,
  pub name: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Item {
  #[cfg(test)]
  pub fn new(id: ItemId, name: impl Into<String>) -> Self {
    Self {
      id,
      name: name.into(),
      extra: Map::new(),
    }
  }

  /// Shallow merge: fields present in `patch` replace ours, everything else is kept.
  pub fn merged(&self, patch: &ItemPatch) -> Item {
    let mut item = self.clone();
    if let Some(name) = &patch.name {
      item.name = name.clone();
    }
    for (key, value) in &patch.extra {
      // id addresses the resource, it is never patched
      if key == "id" {
        continue;
      }
      item.extra.insert(key.clone(), value.clone());
    }
    item
  }
}

/// A partial update, serialized as the `PUT /api/items/{id}` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl ItemPatch {
  pub fn rename(name: impl Into<String>) -> Self {
    Self {
      name: Some(name.into()),
      extra: Map::new(),
    }
  }

  /// Set an arbitrary field on the patch
  #[cfg(test)]
  pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
    self.extra.insert(key.into(), value);
    self
  }

  pub fn is_empty(&self) -> bool {
    self.name.is_none() && self.extra.is_empty()
  }
}
