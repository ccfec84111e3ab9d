//! Versioned cache buckets keyed by request identity.
//!
//! A bucket holds one cache generation. Exactly one generation name is
//! current at a time; activation deletes every other bucket. The store is
//! injected into the worker, so tests run against [`MemoryStore`] while the
//! CLI uses [`SqliteStore`].

#[cfg(test)]
mod memory;
mod sqlite;
mod traits;

#[cfg(test)]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CacheStore, EntryInfo};
