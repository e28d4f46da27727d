//! Store-independent cache façade.
//!
//! A [`Repository`] normalizes durations, implements remember semantics and
//! reports every read and write to an optional [`EventSink`]. Keys pass
//! through a [`KeyScope`] first: [`PlainKeys`] leaves them untouched, while
//! the tagged scope (see [`crate::tagged`]) moves them into a tag namespace.

use crate::clock::{Clock, system_clock};
use crate::error::{CacheError, CacheResult};
use crate::events::{CacheEvent, EventSink};
use crate::expiry::Expiry;
use crate::serialization::{from_value, round_trip, to_value};
use crate::store::{CacheStore, ReferenceKind, Tagging};
use crate::tag_set::TagSet;
use crate::tagged::{TaggedCache, TaggedKeys};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{trace, warn};

/// A key after scoping, as handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKey {
    /// Key passed to the store.
    pub key: String,
    /// Tag namespace the key was derived from.
    pub namespace: Option<String>,
}

impl ItemKey {
    /// Key used as-is.
    pub fn plain(key: &str) -> Self {
        Self {
            key: key.to_string(),
            namespace: None,
        }
    }
}

/// Maps logical keys to store keys and owns the meaning of `flush`.
#[async_trait]
pub trait KeyScope: Send + Sync {
    /// Store key for a logical key.
    async fn item_key(&self, key: &str) -> CacheResult<ItemKey>;

    /// Record that `item` was written.
    async fn record(&self, _item: &ItemKey, _kind: ReferenceKind) -> CacheResult<()> {
        Ok(())
    }

    /// Remove everything this scope can reach.
    async fn flush(&self, store: &dyn CacheStore) -> CacheResult<()>;

    /// Tags reported with events.
    fn tag_names(&self) -> Option<&[String]> {
        None
    }
}

/// Untagged keys: used as given, and `flush` flushes the whole store.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainKeys;

#[async_trait]
impl KeyScope for PlainKeys {
    async fn item_key(&self, key: &str) -> CacheResult<ItemKey> {
        Ok(ItemKey::plain(key))
    }

    async fn flush(&self, store: &dyn CacheStore) -> CacheResult<()> {
        store.flush().await
    }
}

/// Cache façade over a store.
#[derive(Clone)]
pub struct Repository<K: KeyScope = PlainKeys> {
    store: Arc<dyn CacheStore>,
    events: Option<Arc<dyn EventSink>>,
    clock: Arc<dyn Clock>,
    scope: K,
}

impl Repository {
    /// Wrap a store.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_scope(store, PlainKeys)
    }

    /// A tagged cache over this repository's store.
    ///
    /// Stores that track references get a tagged cache whose `flush` deletes
    /// the tagged entries. Stores that only allow untracked tagging get one
    /// whose `flush` merely rotates tag versions. Other stores fail with
    /// [`CacheError::NotSupported`].
    pub fn tags<I, S>(&self, names: I) -> CacheResult<TaggedCache>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tag_set = TagSet::new(self.store.clone(), names);
        let references = match self.store.clone().tagging() {
            Tagging::Tracked(references) => Some(references),
            Tagging::Untracked => {
                warn!(
                    store = self.store.store_type(),
                    "Store does not track tag references; flushing tags will not reclaim entries"
                );
                None
            }
            Tagging::Unsupported => {
                return Err(CacheError::NotSupported(format!(
                    "the {} store does not support tagging",
                    self.store.store_type()
                )));
            }
        };

        let scope = TaggedKeys::new(tag_set, references, self.store.prefix());
        Ok(Repository {
            store: self.store.clone(),
            events: self.events.clone(),
            clock: self.clock.clone(),
            scope,
        })
    }
}

impl<K: KeyScope> Repository<K> {
    /// Wrap a store with an explicit key scope.
    pub fn with_scope(store: Arc<dyn CacheStore>, scope: K) -> Self {
        Self {
            store,
            events: None,
            clock: system_clock(),
            scope,
        }
    }

    /// Report events to `sink`.
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Replace or remove the event sink.
    pub fn set_event_sink(&mut self, sink: Option<Arc<dyn EventSink>>) {
        self.events = sink;
    }

    /// Normalize absolute expiry instants against `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub(crate) fn scope(&self) -> &K {
        &self.scope
    }

    /// Retrieve an item.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        self.get_value(key).await?.map(from_value).transpose()
    }

    /// Retrieve an item, or `default` when it is missing.
    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> CacheResult<T> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Retrieve an item as raw JSON.
    pub async fn get_value(&self, key: &str) -> CacheResult<Option<Value>> {
        let item = self.scope.item_key(key).await?;
        let value = self.store.get(&item.key).await?;

        match &value {
            Some(value) => self.emit(|tags| CacheEvent::Hit {
                key: key.to_string(),
                value: value.clone(),
                tags,
            }),
            None => self.emit(|tags| CacheEvent::Missed {
                key: key.to_string(),
                tags,
            }),
        }

        Ok(value)
    }

    /// Retrieve multiple items. Missing keys map to `None`.
    pub async fn many(&self, keys: &[&str]) -> CacheResult<HashMap<String, Option<Value>>> {
        let items = try_join_all(keys.iter().map(|key| self.scope.item_key(key))).await?;
        let item_keys: Vec<&str> = items.iter().map(|item| item.key.as_str()).collect();
        let found = self.store.many(&item_keys).await?;

        let mut values = HashMap::with_capacity(keys.len());
        for (key, item) in keys.iter().zip(&items) {
            let value = found.get(&item.key).cloned().flatten();
            match &value {
                Some(value) => self.emit(|tags| CacheEvent::Hit {
                    key: key.to_string(),
                    value: value.clone(),
                    tags,
                }),
                None => self.emit(|tags| CacheEvent::Missed {
                    key: key.to_string(),
                    tags,
                }),
            }
            values.insert(key.to_string(), value);
        }
        Ok(values)
    }

    /// Whether an item exists.
    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get_value(key).await?.is_some())
    }

    /// Retrieve an item and remove it.
    ///
    /// Not atomic: a write between the read and the delete is lost.
    pub async fn pull<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let value = self.get(key).await?;
        self.forget(key).await?;
        Ok(value)
    }

    /// Store an item.
    ///
    /// Null values and durations that do not lie in the future are ignored.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expiry: impl Into<Expiry>,
    ) -> CacheResult<()> {
        let value = to_value(value)?;
        let Some(minutes) = expiry.into().minutes(self.clock.now()) else {
            trace!(key = %key, "Skipping cache write without duration");
            return Ok(());
        };
        self.put_value(key, value, minutes).await
    }

    /// Store multiple items. Each entry is an independent `put`.
    pub async fn put_many<T: Serialize>(
        &self,
        items: &[(&str, T)],
        expiry: impl Into<Expiry>,
    ) -> CacheResult<()> {
        let Some(minutes) = expiry.into().minutes(self.clock.now()) else {
            return Ok(());
        };

        let values = items
            .iter()
            .map(|(key, value)| to_value(value).map(|value| (*key, value)))
            .collect::<CacheResult<Vec<_>>>()?;
        try_join_all(
            values
                .into_iter()
                .map(|(key, value)| self.put_value(key, value, minutes)),
        )
        .await?;
        Ok(())
    }

    /// Store an item if the key is absent. Returns whether it was written.
    ///
    /// Uses the store's native set-if-absent when it has one; otherwise this
    /// is a read followed by a write and can race with other writers.
    pub async fn add<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expiry: impl Into<Expiry>,
    ) -> CacheResult<bool> {
        let value = to_value(value)?;
        let Some(minutes) = expiry.into().minutes(self.clock.now()) else {
            return Ok(false);
        };
        if value.is_null() {
            return Ok(false);
        }

        if !self.store.supports_add() {
            if self.get_value(key).await?.is_some() {
                return Ok(false);
            }
            self.put_value(key, value, minutes).await?;
            return Ok(true);
        }

        let item = self.scope.item_key(key).await?;
        if !self.store.add(&item.key, &value, minutes).await? {
            return Ok(false);
        }
        self.scope.record(&item, ReferenceKind::Standard).await?;
        self.emit(|tags| CacheEvent::KeyWritten {
            key: key.to_string(),
            value,
            minutes,
            tags,
        });
        Ok(true)
    }

    /// Increment a counter. `None` if the key is missing or not an integer.
    pub async fn increment(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let item = self.scope.item_key(key).await?;
        self.store.increment(&item.key, delta).await
    }

    /// Decrement a counter. `None` if the key is missing or not an integer.
    pub async fn decrement(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let item = self.scope.item_key(key).await?;
        self.store.decrement(&item.key, delta).await
    }

    /// Store an item indefinitely.
    pub async fn forever<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        let value = to_value(value)?;
        self.forever_value(key, value).await
    }

    /// Get an item, or compute, store and return it.
    ///
    /// The computed value is returned as it will be read back from the
    /// cache, after a serialization round trip.
    pub async fn remember<T, F, Fut>(
        &self,
        key: &str,
        expiry: impl Into<Expiry>,
        compute: F,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = to_value(&compute().await?)?;
        if let Some(minutes) = expiry.into().minutes(self.clock.now()) {
            self.put_value(key, value.clone(), minutes).await?;
        }
        from_value(round_trip(&value)?)
    }

    /// Get an item, or compute and store it forever.
    pub async fn remember_forever<T, F, Fut>(&self, key: &str, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = to_value(&compute().await?)?;
        self.forever_value(key, value.clone()).await?;
        from_value(round_trip(&value)?)
    }

    /// Alias of [`Repository::remember_forever`].
    pub async fn sear<T, F, Fut>(&self, key: &str, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        self.remember_forever(key, compute).await
    }

    /// Remove an item.
    pub async fn forget(&self, key: &str) -> CacheResult<bool> {
        let item = self.scope.item_key(key).await?;
        let removed = self.store.forget(&item.key).await?;
        self.emit(|tags| CacheEvent::KeyForgotten {
            key: key.to_string(),
            tags,
        });
        Ok(removed)
    }

    /// Remove every item reachable through this repository.
    pub async fn flush(&self) -> CacheResult<()> {
        self.scope.flush(self.store.as_ref()).await
    }

    async fn put_value(&self, key: &str, value: Value, minutes: f64) -> CacheResult<()> {
        if value.is_null() {
            trace!(key = %key, "Skipping cache write of null value");
            return Ok(());
        }

        let item = self.scope.item_key(key).await?;
        self.store.put(&item.key, &value, minutes).await?;
        self.scope.record(&item, ReferenceKind::Standard).await?;
        self.emit(|tags| CacheEvent::KeyWritten {
            key: key.to_string(),
            value,
            minutes,
            tags,
        });
        Ok(())
    }

    async fn forever_value(&self, key: &str, value: Value) -> CacheResult<()> {
        let item = self.scope.item_key(key).await?;
        self.store.forever(&item.key, &value).await?;
        self.scope.record(&item, ReferenceKind::Forever).await?;
        self.emit(|tags| CacheEvent::KeyWritten {
            key: key.to_string(),
            value,
            minutes: 0.0,
            tags,
        });
        Ok(())
    }

    fn emit(&self, event: impl FnOnce(Option<Vec<String>>) -> CacheEvent) {
        if let Some(sink) = &self.events {
            sink.emit(&event(self.scope.tag_names().map(<[String]>::to_vec)));
        }
    }
}

impl<K: KeyScope> std::fmt::Debug for Repository<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("store", &self.store.store_type())
            .field("tags", &self.scope.tag_names())
            .field("events", &self.events.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::stores::{MemoryStore, NullStore};
    use chrono::Duration as ChronoDuration;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<CacheEvent>>,
    }

    impl Recorder {
        fn names(&self) -> Vec<&'static str> {
            self.events.lock().iter().map(CacheEvent::name).collect()
        }
    }

    impl EventSink for Recorder {
        fn emit(&self, event: &CacheEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn repository() -> (Repository, Arc<Recorder>, ManualClock) {
        let clock = ManualClock::new();
        let recorder = Arc::new(Recorder::default());
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        let repo = Repository::new(store)
            .with_clock(Arc::new(clock.clone()))
            .with_events(recorder.clone());
        (repo, recorder, clock)
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: u32,
    }

    #[tokio::test]
    async fn test_get_emits_hit_and_missed() {
        let (repo, recorder, _clock) = repository();
        assert_eq!(repo.get::<i32>("a").await.unwrap(), None);

        repo.put("a", &1, 5).await.unwrap();
        assert_eq!(repo.get::<i32>("a").await.unwrap(), Some(1));

        assert_eq!(
            recorder.names(),
            vec!["Cache.missed", "Cache.keyWritten", "Cache.hit"]
        );
        let events = recorder.events.lock();
        assert_eq!(
            events[1],
            CacheEvent::KeyWritten {
                key: "a".to_string(),
                value: json!(1),
                minutes: 5.0,
                tags: None,
            }
        );
    }

    #[tokio::test]
    async fn test_put_expires_after_duration() {
        let (repo, _recorder, clock) = repository();
        repo.put("x", &json!({"a": 1}), 5).await.unwrap();
        assert_eq!(repo.get_value("x").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(repo.increment("x", 1).await.unwrap(), None);

        clock.advance(Duration::from_secs(5 * 60));
        assert!(!repo.has("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_skips_null_and_past_durations() {
        let (repo, recorder, clock) = repository();
        repo.put("null", &Value::Null, 5).await.unwrap();
        repo.put("zero", &1, 0).await.unwrap();
        repo.put("negative", &1, -3).await.unwrap();
        repo.put("past", &1, clock.now() - ChronoDuration::seconds(1))
            .await
            .unwrap();
        repo.put("none", &Option::<i32>::None, 5).await.unwrap();

        for key in ["null", "zero", "negative", "past", "none"] {
            assert!(repo.store().get(key).await.unwrap().is_none(), "{key} written");
        }
        assert!(recorder.names().is_empty());
    }

    #[tokio::test]
    async fn test_put_until_instant() {
        let (repo, recorder, clock) = repository();
        repo.put("k", "v", clock.now() + ChronoDuration::minutes(2))
            .await
            .unwrap();

        let events = recorder.events.lock().clone();
        assert!(matches!(
            &events[0],
            CacheEvent::KeyWritten { minutes, .. } if (*minutes - 2.0).abs() < 1e-9
        ));

        clock.advance(Duration::from_secs(119));
        assert_eq!(repo.get::<String>("k").await.unwrap().as_deref(), Some("v"));
        clock.advance(Duration::from_secs(1));
        assert_eq!(repo.get::<String>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_typed_values() {
        let (repo, _recorder, _clock) = repository();
        let user = User {
            name: "alice".to_string(),
            age: 30,
        };
        repo.put("user", &user, 10).await.unwrap();

        assert_eq!(repo.get::<User>("user").await.unwrap(), Some(user));
        assert!(repo.get::<i32>("user").await.is_err());
        assert_eq!(repo.get_or("other", 7).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_many_and_put_many() {
        let (repo, recorder, _clock) = repository();
        repo.put_many(&[("a", 1), ("b", 2)], 10).await.unwrap();

        let values = repo.many(&["a", "b", "c"]).await.unwrap();
        assert_eq!(values["a"], Some(json!(1)));
        assert_eq!(values["b"], Some(json!(2)));
        assert_eq!(values["c"], None);
        assert_eq!(
            recorder.names(),
            vec![
                "Cache.keyWritten",
                "Cache.keyWritten",
                "Cache.hit",
                "Cache.hit",
                "Cache.missed"
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_removes_item() {
        let (repo, recorder, _clock) = repository();
        repo.put("k", "v", 10).await.unwrap();

        assert_eq!(repo.pull::<String>("k").await.unwrap().as_deref(), Some("v"));
        assert!(!repo.has("k").await.unwrap());
        assert!(recorder.names().contains(&"Cache.keyForgotten"));
    }

    #[tokio::test]
    async fn test_add_native() {
        let (repo, recorder, _clock) = repository();
        assert!(repo.add("k", &1, 10).await.unwrap());
        assert!(!repo.add("k", &2, 10).await.unwrap());
        assert!(!repo.add("zero", &2, 0).await.unwrap());
        assert!(!repo.add("null", &Value::Null, 10).await.unwrap());

        assert_eq!(repo.get::<i32>("k").await.unwrap(), Some(1));
        assert_eq!(recorder.names()[0], "Cache.keyWritten");
    }

    #[tokio::test]
    async fn test_add_falls_back_to_get_then_put() {
        let repo = Repository::new(Arc::new(NullStore::new()));
        assert!(!repo.store().supports_add());

        // The null store never holds the key, so every add "succeeds"
        assert!(repo.add("k", &1, 10).await.unwrap());
        assert!(repo.add("k", &1, 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_forever_reports_zero_minutes() {
        let (repo, recorder, clock) = repository();
        repo.forever("y", &42).await.unwrap();

        clock.advance(Duration::from_secs(9 * 365 * 24 * 3600));
        assert_eq!(repo.get::<i32>("y").await.unwrap(), Some(42));
        assert!(matches!(
            recorder.events.lock()[0],
            CacheEvent::KeyWritten { minutes, .. } if minutes == 0.0
        ));
    }

    #[tokio::test]
    async fn test_remember_computes_once() {
        let (repo, _recorder, _clock) = repository();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Vec<u32> = repo
                .remember("list", 10, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remember_returns_round_tripped_value() {
        let (repo, _recorder, _clock) = repository();
        let value: Value = repo
            .remember("float", 10, || async { Ok(json!({"n": 1.0, "s": "x"})) })
            .await
            .unwrap();

        assert_eq!(Some(value), repo.get_value("float").await.unwrap());
    }

    #[tokio::test]
    async fn test_remember_propagates_compute_errors() {
        let (repo, _recorder, _clock) = repository();
        let result: CacheResult<i32> = repo
            .remember("k", 10, || async { Err(CacheError::Backend("down".to_string())) })
            .await;

        assert!(result.is_err());
        assert!(!repo.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_remember_forever_and_sear() {
        let (repo, recorder, _clock) = repository();
        let first: i32 = repo.remember_forever("k", || async { Ok(1) }).await.unwrap();
        let second: i32 = repo.sear("k", || async { Ok(2) }).await.unwrap();

        assert_eq!((first, second), (1, 1));
        assert!(matches!(
            recorder.events.lock()[1],
            CacheEvent::KeyWritten { minutes, .. } if minutes == 0.0
        ));
    }

    #[tokio::test]
    async fn test_increment_and_decrement() {
        let (repo, _recorder, _clock) = repository();
        assert_eq!(repo.increment("missing", 1).await.unwrap(), None);
        assert!(!repo.has("missing").await.unwrap());

        repo.put("n", &1, 10).await.unwrap();
        assert_eq!(repo.increment("n", 4).await.unwrap(), Some(5));
        assert_eq!(repo.decrement("n", 2).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_flush_delegates_to_store() {
        let (repo, _recorder, _clock) = repository();
        repo.put("a", &1, 10).await.unwrap();
        repo.forever("b", &2).await.unwrap();

        repo.flush().await.unwrap();
        assert!(!repo.has("a").await.unwrap());
        assert!(!repo.has("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_event_sink() {
        let (mut repo, recorder, _clock) = repository();
        repo.set_event_sink(None);
        repo.put("a", &1, 10).await.unwrap();
        assert!(recorder.names().is_empty());
    }
}
