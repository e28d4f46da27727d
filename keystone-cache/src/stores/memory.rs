//! In-process cache store.

use crate::clock::{Clock, system_clock};
use crate::error::CacheResult;
use crate::expiry::{FOREVER_MINUTES, expiration_timestamp};
use crate::serialization::{deserialize, parse_counter, serialize};
use crate::store::{CacheStore, Tagging};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expiration: i64,
}

impl CacheEntry {
    fn is_expired(&self, now: f64) -> bool {
        now >= self.expiration as f64
    }
}

/// Cache entries held in process memory.
///
/// Expired entries are removed lazily when read. Tagged caches over this
/// store are untracked: flushing a tag makes its entries unreachable but
/// leaves them in memory until they expire.
pub struct MemoryStore {
    data: DashMap<String, CacheEntry>,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create an empty store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        debug!("Creating new in-memory cache store");
        Self {
            data: DashMap::new(),
            prefix: String::new(),
            clock,
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Number of physical entries, expired ones included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether a physical (already prefixed) key is present, expired or not.
    pub fn contains_raw(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn write(&self, key: &str, value: &Value, minutes: f64) -> CacheResult<()> {
        let entry = CacheEntry {
            value: serialize(value)?,
            expiration: expiration_timestamp(self.clock.unix_seconds(), minutes),
        };
        self.data.insert(self.build_key(key), entry);
        Ok(())
    }

    fn adjust(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let now = self.clock.unix_seconds();
        match self.data.entry(self.build_key(key)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    return Ok(None);
                }
                let Some(current) = parse_counter(&occupied.get().value) else {
                    return Ok(None);
                };
                let Some(next) = current.checked_add(delta) else {
                    return Ok(None);
                };
                occupied.get_mut().value = next.to_string();
                Ok(Some(next))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        trace!(key = %key, "Memory cache get");

        let key = self.build_key(key);
        let now = self.clock.unix_seconds();
        let entry = match self.data.get(&key) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };

        if entry.is_expired(now) {
            self.data.remove_if(&key, |_, current| current.is_expired(now));
            return Ok(None);
        }

        deserialize(&entry.value).map(Some)
    }

    async fn put(&self, key: &str, value: &Value, minutes: f64) -> CacheResult<()> {
        trace!(key = %key, minutes = minutes, "Memory cache put");
        self.write(key, value, minutes)
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        self.adjust(key, delta)
    }

    async fn decrement(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        match delta.checked_neg() {
            Some(delta) => self.adjust(key, delta),
            None => Ok(None),
        }
    }

    async fn forever(&self, key: &str, value: &Value) -> CacheResult<()> {
        self.write(key, value, FOREVER_MINUTES)
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        self.data.remove(&self.build_key(key));
        Ok(true)
    }

    async fn flush(&self) -> CacheResult<()> {
        debug!(entries = self.data.len(), "Flushing in-memory cache store");
        self.data.clear();
        Ok(())
    }

    fn supports_add(&self) -> bool {
        true
    }

    async fn add(&self, key: &str, value: &Value, minutes: f64) -> CacheResult<bool> {
        let now = self.clock.unix_seconds();
        let entry = CacheEntry {
            value: serialize(value)?,
            expiration: expiration_timestamp(now, minutes),
        };

        match self.data.entry(self.build_key(key)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(entry);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(true)
            }
        }
    }

    fn tagging(self: Arc<Self>) -> Tagging {
        Tagging::Untracked
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
