//! Cache store trait definition.

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Raw storage backend.
///
/// A store knows nothing about tags or events; it only persists serialized
/// values under (prefixed) keys. Durations arrive already normalized to
/// minutes by the repository.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Retrieve an item, treating expired entries as absent.
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Retrieve multiple items concurrently.
    ///
    /// Keys that are not found map to `None`. There is no cross-key
    /// atomicity.
    async fn many(&self, keys: &[&str]) -> CacheResult<HashMap<String, Option<Value>>> {
        use futures::future::try_join_all;

        let values = try_join_all(keys.iter().map(|key| self.get(key))).await?;
        Ok(keys
            .iter()
            .map(|key| key.to_string())
            .zip(values)
            .collect())
    }

    /// Store an item for a number of minutes. Non-positive minutes still write
    /// an entry that is immediately stale.
    async fn put(&self, key: &str, value: &Value, minutes: f64) -> CacheResult<()>;

    /// Store multiple items concurrently.
    async fn put_many(&self, items: &[(&str, Value)], minutes: f64) -> CacheResult<()> {
        use futures::future::try_join_all;

        try_join_all(items.iter().map(|(key, value)| self.put(key, value, minutes))).await?;
        Ok(())
    }

    /// Increment a counter.
    ///
    /// Returns the new value, or `None` if the key is absent or does not hold
    /// an integer. Never creates the key.
    async fn increment(&self, key: &str, delta: i64) -> CacheResult<Option<i64>>;

    /// Decrement a counter. Same contract as [`CacheStore::increment`].
    async fn decrement(&self, key: &str, delta: i64) -> CacheResult<Option<i64>>;

    /// Store an item indefinitely.
    async fn forever(&self, key: &str, value: &Value) -> CacheResult<()>;

    /// Remove an item. Returns `true` whether or not the key existed.
    async fn forget(&self, key: &str) -> CacheResult<bool>;

    /// Remove every item in this store's namespace.
    async fn flush(&self) -> CacheResult<()>;

    /// Whether [`CacheStore::add`] is implemented natively.
    fn supports_add(&self) -> bool {
        false
    }

    /// Store an item only if the key is absent, atomically.
    ///
    /// Returns whether the value was written.
    async fn add(&self, _key: &str, _value: &Value, _minutes: f64) -> CacheResult<bool> {
        Err(CacheError::NotImplemented("add"))
    }

    /// Tagging capability of this store.
    fn tagging(self: Arc<Self>) -> Tagging {
        Tagging::Unsupported
    }

    /// Prefix applied to every physical key.
    fn prefix(&self) -> &str {
        ""
    }

    /// Short backend name for diagnostics.
    fn store_type(&self) -> &'static str;
}

/// How far a store supports tagged caches.
pub enum Tagging {
    /// Tags are rejected with [`CacheError::NotSupported`].
    Unsupported,
    /// Tags namespace keys, but flushing a tag only rotates its version; old
    /// entries linger until their TTL passes.
    Untracked,
    /// Tags namespace keys and every write is recorded in reference sets, so
    /// flushing a tag deletes its entries.
    Tracked(Arc<dyn ReferenceStore>),
}

impl std::fmt::Debug for Tagging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tagging::Unsupported => f.write_str("Unsupported"),
            Tagging::Untracked => f.write_str("Untracked"),
            Tagging::Tracked(_) => f.write_str("Tracked"),
        }
    }
}

/// Which reference set a tagged key is recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Entries written with a TTL.
    Standard,
    /// Entries written without expiry.
    Forever,
}

impl ReferenceKind {
    /// Suffix of the reference set key.
    pub fn suffix(&self) -> &'static str {
        match self {
            ReferenceKind::Standard => "standard_ref",
            ReferenceKind::Forever => "forever_ref",
        }
    }
}

/// Set operations over raw (already prefixed) keys, used for tag reference
/// tracking.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Add `member` to the set stored at `set_key`.
    async fn add_reference(&self, set_key: &str, member: &str) -> CacheResult<()>;

    /// All members of the set stored at `set_key`, without duplicates.
    async fn references(&self, set_key: &str) -> CacheResult<Vec<String>>;

    /// Delete raw keys (entries or sets).
    async fn delete_raw(&self, keys: &[String]) -> CacheResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct MapStore {
        data: Mutex<HashMap<String, Value>>,
    }

    #[async_trait]
    impl CacheStore for MapStore {
        async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
            Ok(self.data.lock().get(key).cloned())
        }

        async fn put(&self, key: &str, value: &Value, _minutes: f64) -> CacheResult<()> {
            self.data.lock().insert(key.to_string(), value.clone());
            Ok(())
        }

        async fn increment(&self, _key: &str, _delta: i64) -> CacheResult<Option<i64>> {
            Ok(None)
        }

        async fn decrement(&self, _key: &str, _delta: i64) -> CacheResult<Option<i64>> {
            Ok(None)
        }

        async fn forever(&self, key: &str, value: &Value) -> CacheResult<()> {
            self.put(key, value, 0.0).await
        }

        async fn forget(&self, key: &str) -> CacheResult<bool> {
            self.data.lock().remove(key);
            Ok(true)
        }

        async fn flush(&self) -> CacheResult<()> {
            self.data.lock().clear();
            Ok(())
        }

        fn store_type(&self) -> &'static str {
            "map"
        }
    }

    #[tokio::test]
    async fn test_default_many_and_put_many() {
        let store = MapStore::default();
        store
            .put_many(&[("a", json!(1)), ("b", json!("two"))], 1.0)
            .await
            .unwrap();

        let values = store.many(&["a", "b", "c"]).await.unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values["a"], Some(json!(1)));
        assert_eq!(values["b"], Some(json!("two")));
        assert_eq!(values["c"], None);
    }

    #[tokio::test]
    async fn test_optional_capabilities_default_off() {
        let store = Arc::new(MapStore::default());
        assert!(!store.supports_add());
        assert!(matches!(
            store.add("a", &json!(1), 1.0).await,
            Err(CacheError::NotImplemented("add"))
        ));
        assert!(matches!(store.tagging(), Tagging::Unsupported));
    }

    #[test]
    fn test_reference_suffixes() {
        assert_eq!(ReferenceKind::Standard.suffix(), "standard_ref");
        assert_eq!(ReferenceKind::Forever.suffix(), "forever_ref");
    }
}
