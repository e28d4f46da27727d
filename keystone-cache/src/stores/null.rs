//! Store that keeps nothing.

use crate::error::CacheResult;
use crate::store::{CacheStore, Tagging};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Accepts every write and never returns a value.
///
/// Useful to disable caching without changing call sites.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl NullStore {
    /// Create a new null store.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStore for NullStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<Value>> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: &Value, _minutes: f64) -> CacheResult<()> {
        Ok(())
    }

    async fn increment(&self, _key: &str, _delta: i64) -> CacheResult<Option<i64>> {
        Ok(None)
    }

    async fn decrement(&self, _key: &str, _delta: i64) -> CacheResult<Option<i64>> {
        Ok(None)
    }

    async fn forever(&self, _key: &str, _value: &Value) -> CacheResult<()> {
        Ok(())
    }

    async fn forget(&self, _key: &str) -> CacheResult<bool> {
        Ok(true)
    }

    async fn flush(&self) -> CacheResult<()> {
        Ok(())
    }

    fn tagging(self: Arc<Self>) -> Tagging {
        Tagging::Untracked
    }

    fn store_type(&self) -> &'static str {
        "null"
    }
}
