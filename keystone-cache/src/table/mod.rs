//! Relational table access for the database store.
//!
//! The database store does not speak SQL itself. It drives a [`CacheTable`],
//! a transactional view over one table with the columns `key` (unique),
//! `value` (text) and `expiration` (unix seconds). Hosts supply tables
//! through [`TableConnections`].
//!
//! Two implementations ship with the crate: [`MemoryTable`], an in-process
//! table with real row locking, and (feature `postgres`) `PgTable` over a
//! `sqlx` pool.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::{MemoryTable, MemoryTables};
#[cfg(feature = "postgres")]
pub use postgres::{PgConnections, PgTable};

use crate::error::CacheResult;
use async_trait::async_trait;
use std::sync::Arc;

/// One row of the cache table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRow {
    /// Prefixed cache key.
    pub key: String,
    /// Serialized value.
    pub value: String,
    /// Unix timestamp (seconds) the row expires at.
    pub expiration: i64,
}

/// Transactional access to the cache table.
#[async_trait]
pub trait CacheTable: Send + Sync {
    /// Fetch a row by key.
    async fn find(&self, key: &str) -> CacheResult<Option<CacheRow>>;

    /// Insert a row, replacing value and expiration if the key exists.
    async fn upsert(&self, row: CacheRow) -> CacheResult<()>;

    /// Delete a row. Returns the number of rows removed.
    async fn delete(&self, key: &str) -> CacheResult<u64>;

    /// Delete the row `key` only if it still carries `expiration`. Returns the
    /// number of rows removed.
    async fn delete_expired_key(&self, key: &str, expiration: i64) -> CacheResult<u64>;

    /// Delete every row whose key starts with `prefix`.
    async fn delete_prefixed(&self, prefix: &str) -> CacheResult<u64>;

    /// Delete every row with `expiration <= now`.
    async fn delete_expired(&self, now: i64) -> CacheResult<u64>;

    /// Open a transaction.
    async fn begin(&self) -> CacheResult<Box<dyn TableTransaction>>;
}

/// A table transaction.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait TableTransaction: Send {
    /// Fetch a row and hold an exclusive lock on it until the transaction ends.
    async fn find_for_update(&mut self, key: &str) -> CacheResult<Option<CacheRow>>;

    /// Replace the value of a row.
    async fn update_value(&mut self, key: &str, value: &str) -> CacheResult<()>;

    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> CacheResult<()>;
}

/// Resolves cache tables by connection and table name.
#[async_trait]
pub trait TableConnections: Send + Sync {
    /// Table `table` on the named connection, or on the default connection.
    async fn table(&self, connection: Option<&str>, table: &str) -> CacheResult<Arc<dyn CacheTable>>;
}
