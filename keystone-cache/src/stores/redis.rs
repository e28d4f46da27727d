//! Remote key/value cache store.

use crate::error::CacheResult;
use crate::expiry::ttl_seconds;
use crate::kv::RemoteKv;
use crate::serialization::{deserialize, serialize};
use crate::store::{CacheStore, ReferenceStore, Tagging};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Cache entries stored on a Redis-compatible server.
///
/// Expiry is delegated to native TTLs, so TTLs shorter than a second are
/// rounded up to one. Tagged caches over this store are tracked: every
/// tagged write is recorded in per-tag reference sets on the server, and
/// flushing a tag deletes exactly those keys.
pub struct RedisStore {
    kv: Arc<dyn RemoteKv>,
    prefix: String,
}

impl RedisStore {
    /// Create a store over `kv`.
    ///
    /// A non-empty prefix gets a trailing `:` separator.
    pub fn new(kv: Arc<dyn RemoteKv>, prefix: impl AsRef<str>) -> Self {
        let prefix = match prefix.as_ref() {
            "" => String::new(),
            prefix => format!("{prefix}:"),
        };
        debug!(prefix = %prefix, "Creating Redis cache store");
        Self { kv, prefix }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<dyn RemoteKv> {
        &self.kv
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        trace!(key = %key, "Redis cache get");
        match self.kv.get(&self.build_key(key)).await? {
            Some(raw) => deserialize(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &Value, minutes: f64) -> CacheResult<()> {
        trace!(key = %key, minutes = minutes, "Redis cache put");
        self.kv
            .set_ex(&self.build_key(key), &serialize(value)?, ttl_seconds(minutes))
            .await
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        self.kv.incr_by(&self.build_key(key), delta).await
    }

    async fn decrement(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        self.kv.decr_by(&self.build_key(key), delta).await
    }

    async fn forever(&self, key: &str, value: &Value) -> CacheResult<()> {
        self.kv.set(&self.build_key(key), &serialize(value)?).await
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        self.kv.del(&[self.build_key(key)]).await?;
        Ok(true)
    }

    async fn flush(&self) -> CacheResult<()> {
        debug!("Flushing Redis database");
        self.kv.flushdb().await
    }

    fn supports_add(&self) -> bool {
        true
    }

    async fn add(&self, key: &str, value: &Value, minutes: f64) -> CacheResult<bool> {
        self.kv
            .set_nx_ex(&self.build_key(key), &serialize(value)?, ttl_seconds(minutes))
            .await
    }

    fn tagging(self: Arc<Self>) -> Tagging {
        Tagging::Tracked(self)
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

#[async_trait]
impl ReferenceStore for RedisStore {
    async fn add_reference(&self, set_key: &str, member: &str) -> CacheResult<()> {
        self.kv.sadd(set_key, member).await
    }

    async fn references(&self, set_key: &str) -> CacheResult<Vec<String>> {
        let mut members = self.kv.smembers(set_key).await?;
        members.sort();
        members.dedup();
        Ok(members)
    }

    async fn delete_raw(&self, keys: &[String]) -> CacheResult<()> {
        self.kv.del(keys).await
    }
}
