//! In-memory item collection with optimistic updates.
//!
//! `ItemStore` is the local copy of the `/api/items` list. Views read from it,
//! and renames are applied here synchronously before the `PUT` goes out.
//! Each optimistic update gets an [`UpdateTicket`]; when the request
//! resolves the ticket is handed back via [`ItemStore::confirm`] or
//! [`ItemStore::fail`].
//!
//! Per entry we keep the last value the server told us about (the base) and
//! the patches issued since, each flagged while its request is in flight.
//! The displayed value is always the base with every newer patch applied in
//! issue order, so the last patch issued wins no matter which response
//! lands first. [`ItemStore::begin_update`] is [`ItemStore::patch`] plus a
//! ticket for the request.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::types::{Item, ItemId, ItemPatch};

/// What to do with an optimistic patch whose request failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
  /// Drop the patch and show the last server value again
  #[default]
  Revert,
  /// Keep showing the patched value but flag the entry until the next fetch
  MarkStale,
}

/// Handle for one optimistic update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdateTicket {
  pub id: ItemId,
  seq: u64,
}

/// Optimistic state of a single entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
  /// Matches the last fetch
  Clean,
  /// At least one update is in flight
  Pending,
  /// Last update was accepted by the server
  Confirmed,
  /// Last update failed and was rolled back
  Reverted(String),
  /// Last update failed, local value kept
  Stale(String),
}

#[derive(Debug, Clone)]
enum Resolution {
  Clean,
  Confirmed,
  Reverted(String),
  Stale(String),
}

/// A patch stacked on top of the base
#[derive(Debug)]
struct Applied {
  seq: u64,
  patch: ItemPatch,
  /// A request carrying this patch hasn't settled yet
  in_flight: bool,
}

#[derive(Debug)]
struct Tracked {
  base: Item,
  /// Sequence number that produced `base`, 0 when it came from a fetch
  base_seq: u64,
  /// Patches in issue order
  applied: Vec<Applied>,
  resolution: Resolution,
}

impl Tracked {
  fn new(base: Item) -> Self {
    Self {
      base,
      base_seq: 0,
      applied: Vec::new(),
      resolution: Resolution::Clean,
    }
  }

  /// Base with every newer patch up to and including `upto` applied
  fn merged_through(&self, upto: u64) -> Item {
    self
      .applied
      .iter()
      .filter(|a| a.seq > self.base_seq && a.seq <= upto)
      .fold(self.base.clone(), |item, a| item.merged(&a.patch))
  }

  fn display(&self) -> Item {
    self.merged_through(u64::MAX)
  }

  fn in_flight_count(&self) -> usize {
    self.applied.iter().filter(|a| a.in_flight).count()
  }

  fn in_flight_position(&self, seq: u64) -> Option<usize> {
    self.applied.iter().position(|a| a.in_flight && a.seq == seq)
  }

  /// Adopt `base` as the value produced by patch `seq`
  fn rebase(&mut self, base: Item, seq: u64) {
    self.base = base;
    self.base_seq = seq;
    // Local patches at or before `seq` are folded into the new base
    self.applied.retain(|a| a.in_flight || a.seq > seq);
  }

  fn state(&self) -> EntryState {
    if self.in_flight_count() > 0 {
      return EntryState::Pending;
    }
    match &self.resolution {
      Resolution::Clean => EntryState::Clean,
      Resolution::Confirmed => EntryState::Confirmed,
      Resolution::Reverted(e) => EntryState::Reverted(e.clone()),
      Resolution::Stale(e) => EntryState::Stale(e.clone()),
    }
  }
}

/// Session-owned item cache.
#[derive(Debug, Default)]
pub struct ItemStore {
  /// `None` until the first successful fetch
  items: Option<Vec<Item>>,
  tracked: HashMap<ItemId, Tracked>,
  next_seq: u64,
  policy: FailurePolicy,
  last_error: Option<String>,
}

impl ItemStore {
  pub fn new(policy: FailurePolicy) -> Self {
    Self {
      policy,
      ..Self::default()
    }
  }

  pub fn is_loaded(&self) -> bool {
    self.items.is_some()
  }

  /// The cached collection, `None` if nothing has been fetched yet.
  pub fn items(&self) -> Option<&[Item]> {
    self.items.as_deref()
  }

  pub fn get(&self, id: ItemId) -> Option<&Item> {
    self.items.as_ref()?.iter().find(|item| item.id == id)
  }

  pub fn state(&self, id: ItemId) -> EntryState {
    self
      .tracked
      .get(&id)
      .map(Tracked::state)
      .unwrap_or(EntryState::Clean)
  }

  /// Number of updates still waiting for the server
  pub fn pending_count(&self) -> usize {
    self.tracked.values().map(Tracked::in_flight_count).sum()
  }

  /// Most recent update failure, if any
  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
  }

  /// Replace the collection with a fresh fetch result.
  ///
  /// Updates still in flight are re-applied on top of the new data, local
  /// patches are dropped. Entries that vanished from the server lose their
  /// tracking.
  pub fn seed(&mut self, items: Vec<Item>) {
    let mut items = dedup_by_id(items);

    self.tracked.retain(|id, tracked| {
      let Some(fresh) = items.iter().find(|item| item.id == *id) else {
        debug!(id, "Dropping tracking for item missing from fetch");
        return false;
      };
      tracked.base = fresh.clone();
      tracked.resolution = Resolution::Clean;
      tracked.applied.retain(|a| a.in_flight);
      !tracked.applied.is_empty()
    });

    for item in &mut items {
      if let Some(tracked) = self.tracked.get(&item.id) {
        *item = tracked.display();
      }
    }

    debug!(count = items.len(), "Seeded item store");
    self.items = Some(items);
  }

  /// Shallow-merge `patch` into the entry with `id` and return the result.
  ///
  /// Patches stack in issue order, so this one shows even while older
  /// updates of the same entry are in flight. No-op returning `None` when
  /// the store isn't loaded or the id is unknown.
  pub fn patch(&mut self, id: ItemId, patch: &ItemPatch) -> Option<Item> {
    let current = self.get(id)?.clone();

    self.next_seq += 1;
    let seq = self.next_seq;

    let tracked = self
      .tracked
      .entry(id)
      .or_insert_with(|| Tracked::new(current));
    tracked.applied.push(Applied {
      seq,
      patch: patch.clone(),
      in_flight: false,
    });

    self.refresh(id)
  }

  /// Apply `patch` optimistically and track the request that carries it.
  ///
  /// Same no-op conditions as [`ItemStore::patch`].
  pub fn begin_update(&mut self, id: ItemId, patch: ItemPatch) -> Option<UpdateTicket> {
    self.patch(id, &patch)?;

    let applied = self.tracked.get_mut(&id)?.applied.last_mut()?;
    applied.in_flight = true;
    let seq = applied.seq;

    debug!(id, seq, "Optimistic update applied");
    Some(UpdateTicket { id, seq })
  }

  /// The server accepted the update behind `ticket`.
  pub fn confirm(&mut self, ticket: UpdateTicket, server_item: Item) {
    let Some(tracked) = self.tracked.get_mut(&ticket.id) else {
      return;
    };
    let Some(pos) = tracked.in_flight_position(ticket.seq) else {
      return;
    };
    let local = tracked.merged_through(ticket.seq);
    tracked.applied.remove(pos);

    if ticket.seq > tracked.base_seq {
      let base = if server_item.id == ticket.id {
        server_item
      } else {
        warn!(
          id = ticket.id,
          returned = server_item.id,
          "Server answered update with a different item, keeping local merge"
        );
        local
      };
      tracked.rebase(base, ticket.seq);
    }
    tracked.resolution = Resolution::Confirmed;

    debug!(id = ticket.id, seq = ticket.seq, "Update confirmed");
    self.refresh(ticket.id);
  }

  /// The update behind `ticket` failed.
  pub fn fail(&mut self, ticket: UpdateTicket, error: impl Into<String>) {
    let error = error.into();
    let Some(tracked) = self.tracked.get_mut(&ticket.id) else {
      return;
    };
    let Some(pos) = tracked.in_flight_position(ticket.seq) else {
      return;
    };
    let local = tracked.merged_through(ticket.seq);
    tracked.applied.remove(pos);

    match self.policy {
      FailurePolicy::Revert => {
        tracked.resolution = Resolution::Reverted(error.clone());
      }
      FailurePolicy::MarkStale => {
        if ticket.seq > tracked.base_seq {
          tracked.rebase(local, ticket.seq);
        }
        tracked.resolution = Resolution::Stale(error.clone());
      }
    }

    warn!(id = ticket.id, seq = ticket.seq, policy = ?self.policy, %error, "Update failed");
    self.last_error = Some(format!("Update of item {} failed: {}", ticket.id, error));
    self.refresh(ticket.id);
  }

  /// Rewrite the displayed entry for `id` from its tracked state
  fn refresh(&mut self, id: ItemId) -> Option<Item> {
    let display = self.tracked.get(&id)?.display();
    let entry = self
      .items
      .as_mut()?
      .iter_mut()
      .find(|item| item.id == id)?;
    *entry = display.clone();
    Some(display)
  }
}

/// Keep the first occurrence of each id
fn dedup_by_id(items: Vec<Item>) -> Vec<Item> {
  let mut seen = std::collections::HashSet::new();
  items
    .into_iter()
    .filter(|item| {
      let fresh = seen.insert(item.id);
      if !fresh {
        warn!(id = item.id, "Duplicate id in item list, keeping the first");
      }
      fresh
    })
    .collect()
}
