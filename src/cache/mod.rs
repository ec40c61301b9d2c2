//! Persistent snapshot cache for list queries.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Caches entities by key, grouped into ordered query results
//! - Serves fresh results without touching the network
//! - Provides basic offline mode (serve stale cache when network unavailable)
//! - Accepts confirmed entity writes without reordering cached results

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{ConfiguredStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, Cacheable, QueryKey};
