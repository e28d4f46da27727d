//! Table-backed cache store.

use crate::clock::{Clock, system_clock};
use crate::error::CacheResult;
use crate::expiry::{FOREVER_MINUTES, expiration_timestamp};
use crate::serialization::{deserialize, parse_counter, serialize};
use crate::store::{CacheStore, Tagging};
use crate::table::{CacheRow, CacheTable};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Default garbage collection probability, in parts per million (0.01%).
pub const DEFAULT_GC_PROBABILITY: u32 = 100;

const GC_SCALE: u32 = 1_000_000;

/// Cache entries stored as rows of a relational table.
///
/// Expired rows are deleted when read, and after each write the store
/// removes all expired rows with probability `gc_probability / 1_000_000`.
pub struct DatabaseStore {
    table: Arc<dyn CacheTable>,
    prefix: String,
    gc_probability: u32,
    clock: Arc<dyn Clock>,
}

impl DatabaseStore {
    /// Create a store over `table`, prefixing every key with `prefix`.
    pub fn new(table: Arc<dyn CacheTable>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        debug!(prefix = %prefix, "Creating database cache store");
        Self {
            table,
            prefix,
            gc_probability: DEFAULT_GC_PROBABILITY,
            clock: system_clock(),
        }
    }

    /// Set the garbage collection probability in parts per million.
    ///
    /// `0` disables collection; values above 1,000,000 collect on every write.
    pub fn with_gc_probability(mut self, ppm: u32) -> Self {
        self.gc_probability = ppm;
        self
    }

    /// Read time from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying table.
    pub fn table(&self) -> &Arc<dyn CacheTable> {
        &self.table
    }

    /// Garbage collection probability in parts per million.
    pub fn gc_probability(&self) -> u32 {
        self.gc_probability
    }

    /// Delete expired rows.
    ///
    /// Without `force` the sweep only happens with the configured probability.
    /// Returns the number of rows removed.
    pub async fn gc(&self, force: bool) -> CacheResult<u64> {
        if !force && !self.should_collect() {
            return Ok(0);
        }

        let now = self.clock.unix_seconds().floor() as i64;
        let removed = self.table.delete_expired(now).await?;
        debug!(removed = removed, "Cache table garbage collection");
        Ok(removed)
    }

    fn should_collect(&self) -> bool {
        self.gc_probability > 0 && rand::random_range(0..GC_SCALE) < self.gc_probability
    }

    fn is_expired(&self, row: &CacheRow) -> bool {
        self.clock.unix_seconds() >= row.expiration as f64
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn row(&self, key: &str, value: &Value, minutes: f64) -> CacheResult<CacheRow> {
        Ok(CacheRow {
            key: self.build_key(key),
            value: serialize(value)?,
            expiration: expiration_timestamp(self.clock.unix_seconds(), minutes),
        })
    }

    async fn adjust(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let key = self.build_key(key);
        let mut tx = self.table.begin().await?;

        let Some(row) = tx.find_for_update(&key).await? else {
            return Ok(None);
        };
        if self.is_expired(&row) {
            return Ok(None);
        }
        let Some(next) = parse_counter(&row.value).and_then(|current| current.checked_add(delta))
        else {
            return Ok(None);
        };

        tx.update_value(&key, &next.to_string()).await?;
        tx.commit().await?;
        trace!(key = %key, value = next, "Database cache counter updated");
        Ok(Some(next))
    }
}

#[async_trait]
impl CacheStore for DatabaseStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        trace!(key = %key, "Database cache get");

        let key = self.build_key(key);
        let Some(row) = self.table.find(&key).await? else {
            return Ok(None);
        };

        if self.is_expired(&row) {
            // A concurrent put may have replaced the row since it was read
            self.table.delete_expired_key(&key, row.expiration).await?;
            return Ok(None);
        }

        deserialize(&row.value).map(Some)
    }

    async fn put(&self, key: &str, value: &Value, minutes: f64) -> CacheResult<()> {
        trace!(key = %key, minutes = minutes, "Database cache put");
        self.table.upsert(self.row(key, value, minutes)?).await?;
        self.gc(false).await?;
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        self.adjust(key, delta).await
    }

    async fn decrement(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        match delta.checked_neg() {
            Some(delta) => self.adjust(key, delta).await,
            None => Ok(None),
        }
    }

    async fn forever(&self, key: &str, value: &Value) -> CacheResult<()> {
        self.put(key, value, FOREVER_MINUTES).await
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        self.table.delete(&self.build_key(key)).await?;
        Ok(true)
    }

    async fn flush(&self) -> CacheResult<()> {
        let removed = self.table.delete_prefixed(&self.prefix).await?;
        debug!(removed = removed, prefix = %self.prefix, "Flushed database cache store");
        Ok(())
    }

    fn tagging(self: Arc<Self>) -> Tagging {
        Tagging::Untracked
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn store_type(&self) -> &'static str {
        "database"
    }
}
