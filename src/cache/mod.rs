//! Versioned blob stores for offline content.
//!
//! This module provides the storage side of the interceptor:
//! - Named stores, one per deployed version
//! - Response snapshots keyed by request identity (method + URL)
//! - A SQLite backend for persistence and an in-memory one for ephemeral runs

mod storage;
mod traits;

pub use storage::{CacheStorage, MemoryStorage, SqliteStorage};
pub use traits::CacheResult;
#[cfg(test)]
pub use traits::{CacheSource, CachedResponse, EntrySummary};
