//! Response cache organised in named, versioned generations.
//!
//! This module provides:
//! - `Generations`: purpose → generation map for one cache version
//! - `CacheLayer`: cache-first and network-first strategies with background writes
//! - `SqliteStorage`: durable storage for generations and their entries

mod generations;
mod layer;
mod storage;
mod traits;

pub use generations::Generations;
pub use layer::{run_blocking, CacheLayer};
pub use storage::SqliteStorage;
pub use traits::{CacheResult, CacheStorage, Purpose};

#[cfg(test)]
pub use traits::{CacheSource, CachedEntry, StoredResponse};
