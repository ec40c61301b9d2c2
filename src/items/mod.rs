mod cache;
pub mod cached_client;
pub mod client;
pub mod store;
pub mod types;

pub use cached_client::CachedItemsClient;
pub use store::{EntryState, FailurePolicy, ItemStore, UpdateTicket};
pub use types::{Item, ItemId, ItemPatch};
