//! Store resolution.
//!
//! The [`CacheManager`] turns a [`CacheConfig`] into repositories: it looks
//! up a store by name, builds it with the configured driver and caches the
//! wrapping [`Repository`] for later calls.
//!
//! Built-in drivers are `null`, `memory` (alias `object`), `database` and
//! `redis`. Custom drivers are registered as a [`StoreFactory`] on the
//! builder and take precedence over built-ins of the same name.

use crate::clock::{Clock, system_clock};
use crate::config::{CacheConfig, StoreConfig};
use crate::error::{CacheError, CacheResult};
use crate::events::EventSink;
use crate::kv::KvConnections;
use crate::repository::Repository;
use crate::store::CacheStore;
use crate::stores::{DEFAULT_GC_PROBABILITY, DatabaseStore, MemoryStore, NullStore, RedisStore};
use crate::table::TableConnections;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Default Redis connection name for the `redis` driver.
pub const DEFAULT_REDIS_CONNECTION: &str = "local";

/// Host resources available to store factories.
#[derive(Clone)]
pub struct CacheContext {
    /// Cache tables for the `database` driver.
    pub tables: Option<Arc<dyn TableConnections>>,
    /// Remote key/value connections for the `redis` driver.
    pub kv: Option<Arc<dyn KvConnections>>,
    /// Time source for stores that expire entries themselves.
    pub clock: Arc<dyn Clock>,
}

impl Default for CacheContext {
    fn default() -> Self {
        Self {
            tables: None,
            kv: None,
            clock: system_clock(),
        }
    }
}

/// Creates a store from its configuration.
///
/// The configuration handed to a factory has its prefix resolved: the
/// store's own prefix, else the global one.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Build the store.
    async fn create(
        &self,
        context: &CacheContext,
        config: &StoreConfig,
    ) -> CacheResult<Arc<dyn CacheStore>>;
}

#[async_trait]
impl<F> StoreFactory for F
where
    F: Fn(&CacheContext, &StoreConfig) -> CacheResult<Arc<dyn CacheStore>> + Send + Sync,
{
    async fn create(
        &self,
        context: &CacheContext,
        config: &StoreConfig,
    ) -> CacheResult<Arc<dyn CacheStore>> {
        self(context, config)
    }
}

/// Custom drivers by name.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, Arc<dyn StoreFactory>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `driver`, replacing any previous one.
    pub fn register(&mut self, driver: impl Into<String>, factory: Arc<dyn StoreFactory>) {
        self.factories.insert(driver.into(), factory);
    }

    /// Factory registered for `driver`.
    pub fn get(&self, driver: &str) -> Option<&Arc<dyn StoreFactory>> {
        self.factories.get(driver)
    }

    /// Whether a factory is registered for `driver`.
    pub fn contains(&self, driver: &str) -> bool {
        self.factories.contains_key(driver)
    }
}

/// Resolves configured stores to shared repositories.
pub struct CacheManager {
    config: CacheConfig,
    context: CacheContext,
    drivers: DriverRegistry,
    events: Option<Arc<dyn EventSink>>,
    repositories: RwLock<HashMap<String, Arc<Repository>>>,
}

impl CacheManager {
    /// Manager with no host resources and no custom drivers.
    pub fn new(config: CacheConfig) -> Self {
        Self::builder(config).build()
    }

    /// Start building a manager.
    pub fn builder(config: CacheConfig) -> CacheManagerBuilder {
        CacheManagerBuilder {
            config,
            context: CacheContext::default(),
            drivers: DriverRegistry::new(),
            events: None,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Name of the default store.
    pub fn default_driver(&self) -> &str {
        &self.config.default
    }

    /// The default store.
    pub async fn default_store(&self) -> CacheResult<Arc<Repository>> {
        self.store(None).await
    }

    /// Repository of store `name`, or of the default store.
    ///
    /// Repositories are created once per name and shared afterwards.
    pub async fn store(&self, name: Option<&str>) -> CacheResult<Arc<Repository>> {
        let name = name.unwrap_or(self.config.default.as_str());

        if let Some(repository) = self.repositories.read().get(name) {
            return Ok(repository.clone());
        }

        let store = self.resolve(name).await?;
        let repository = Arc::new(self.repository(store));

        // A concurrent caller may have resolved the same name; keep the first
        let mut repositories = self.repositories.write();
        Ok(repositories
            .entry(name.to_string())
            .or_insert(repository)
            .clone())
    }

    /// Wrap a store in a repository reporting to this manager's event sink.
    pub fn repository(&self, store: Arc<dyn CacheStore>) -> Repository {
        let repository = Repository::new(store).with_clock(self.context.clock.clone());
        match &self.events {
            Some(events) => repository.with_events(events.clone()),
            None => repository,
        }
    }

    /// Drop the cached repository of store `name`.
    ///
    /// The next [`CacheManager::store`] call builds a fresh store.
    pub fn forget_store(&self, name: &str) -> bool {
        self.repositories.write().remove(name).is_some()
    }

    async fn resolve(&self, name: &str) -> CacheResult<Arc<dyn CacheStore>> {
        let config = self
            .config
            .store(name)
            .ok_or_else(|| CacheError::UnknownStore(name.to_string()))?;

        let mut resolved = config.clone();
        resolved.prefix = Some(self.config.prefix_for(config).to_string());

        let store = match self.drivers.get(&resolved.driver) {
            Some(factory) => factory.create(&self.context, &resolved).await?,
            None => self.create_builtin(&resolved).await?,
        };

        info!(
            store = %name,
            driver = %resolved.driver,
            backend = store.store_type(),
            "Resolved cache store"
        );
        Ok(store)
    }

    async fn create_builtin(&self, config: &StoreConfig) -> CacheResult<Arc<dyn CacheStore>> {
        let prefix = config.prefix.clone().unwrap_or_default();

        match config.driver.as_str() {
            "null" => Ok(Arc::new(NullStore::new())),
            "memory" | "object" => Ok(Arc::new(
                MemoryStore::with_clock(self.context.clock.clone()).with_prefix(prefix),
            )),
            "database" => self.create_database(config, prefix).await,
            "redis" => self.create_redis(config, prefix).await,
            other => Err(CacheError::UnsupportedDriver(other.to_string())),
        }
    }

    async fn create_database(
        &self,
        config: &StoreConfig,
        prefix: String,
    ) -> CacheResult<Arc<dyn CacheStore>> {
        let tables = self.context.tables.as_ref().ok_or_else(|| {
            CacheError::Config("the database driver requires table connections".to_string())
        })?;
        let table_name = config
            .option_str("table")
            .ok_or_else(|| CacheError::Config("the database driver requires a table".to_string()))?;
        let gc_probability = config
            .option_u64("gc_probability")
            .map_or(DEFAULT_GC_PROBABILITY, |p| u32::try_from(p).unwrap_or(u32::MAX));

        debug!(table = %table_name, "Creating database cache store");
        let table = tables.table(config.option_str("connection"), table_name).await?;
        Ok(Arc::new(
            DatabaseStore::new(table, prefix)
                .with_gc_probability(gc_probability)
                .with_clock(self.context.clock.clone()),
        ))
    }

    async fn create_redis(
        &self,
        config: &StoreConfig,
        prefix: String,
    ) -> CacheResult<Arc<dyn CacheStore>> {
        let kv = self.context.kv.as_ref().ok_or_else(|| {
            CacheError::Config("the redis driver requires key/value connections".to_string())
        })?;
        let connection = config
            .option_str("connection")
            .unwrap_or(DEFAULT_REDIS_CONNECTION);

        let kv = kv.connection(connection).await?;
        Ok(Arc::new(RedisStore::new(kv, prefix)))
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("default", &self.config.default)
            .field("stores", &self.config.stores.keys().collect::<Vec<_>>())
            .field("resolved", &self.repositories.read().len())
            .finish()
    }
}

/// Builder for [`CacheManager`].
pub struct CacheManagerBuilder {
    config: CacheConfig,
    context: CacheContext,
    drivers: DriverRegistry,
    events: Option<Arc<dyn EventSink>>,
}

impl CacheManagerBuilder {
    /// Cache tables for the `database` driver.
    pub fn with_tables(mut self, tables: Arc<dyn TableConnections>) -> Self {
        self.context.tables = Some(tables);
        self
    }

    /// Key/value connections for the `redis` driver.
    pub fn with_kv(mut self, kv: Arc<dyn KvConnections>) -> Self {
        self.context.kv = Some(kv);
        self
    }

    /// Report events of every resolved repository to `sink`.
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Time source for stores and repositories.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.context.clock = clock;
        self
    }

    /// Register a custom driver.
    pub fn with_driver(mut self, driver: impl Into<String>, factory: Arc<dyn StoreFactory>) -> Self {
        self.drivers.register(driver, factory);
        self
    }

    /// Use `drivers` as the custom driver registry.
    pub fn with_drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = drivers;
        self
    }

    /// Build the manager.
    pub fn build(self) -> CacheManager {
        CacheManager {
            config: self.config,
            context: self.context,
            drivers: self.drivers,
            events: self.events,
            repositories: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::CacheEvent;
    use crate::kv::MemoryKvConnections;
    use crate::table::MemoryTables;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> CacheConfig {
        CacheConfig::new("memory")
            .with_prefix("app_")
            .with_store("memory", StoreConfig::memory())
            .with_store("object", StoreConfig::new("object").with_prefix("obj_"))
            .with_store("null", StoreConfig::null())
            .with_store("database", StoreConfig::database("cache").with_option("gc_probability", 0))
            .with_store("redis", StoreConfig::redis("cache"))
            .with_store("files", StoreConfig::new("file"))
    }

    #[tokio::test]
    async fn test_default_store_is_cached() {
        let manager = CacheManager::new(config());
        assert_eq!(manager.default_driver(), "memory");

        let first = manager.default_store().await.unwrap();
        let second = manager.store(Some("memory")).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.store().store_type(), "memory");
        assert_eq!(first.store().prefix(), "app_");

        assert!(manager.forget_store("memory"));
        let third = manager.store(None).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_builtin_drivers() {
        let tables = Arc::new(MemoryTables::new());
        let manager = CacheManager::builder(config())
            .with_tables(tables.clone())
            .with_kv(Arc::new(MemoryKvConnections::new()))
            .build();

        let object = manager.store(Some("object")).await.unwrap();
        assert_eq!(object.store().store_type(), "memory");
        assert_eq!(object.store().prefix(), "obj_");

        let null = manager.store(Some("null")).await.unwrap();
        assert_eq!(null.store().store_type(), "null");

        let database = manager.store(Some("database")).await.unwrap();
        database.put("k", &1, 10).await.unwrap();
        let rows = tables.get(None, "cache").rows().await;
        assert_eq!(rows[0].key, "app_k");

        let redis = manager.store(Some("redis")).await.unwrap();
        assert_eq!(redis.store().store_type(), "redis");
        assert_eq!(redis.store().prefix(), "app_:");
    }

    #[tokio::test]
    async fn test_resolution_errors() {
        let manager = CacheManager::new(config());

        assert!(matches!(
            manager.store(Some("missing")).await,
            Err(CacheError::UnknownStore(name)) if name == "missing"
        ));
        assert!(matches!(
            manager.store(Some("files")).await,
            Err(CacheError::UnsupportedDriver(driver)) if driver == "file"
        ));
        assert!(matches!(
            manager.store(Some("database")).await,
            Err(CacheError::Config(_))
        ));
        assert!(matches!(
            manager.store(Some("redis")).await,
            Err(CacheError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_driver() {
        let created = Arc::new(AtomicUsize::new(0));
        let factory = {
            let created = created.clone();
            move |context: &CacheContext, config: &StoreConfig| -> CacheResult<Arc<dyn CacheStore>> {
                created.fetch_add(1, Ordering::SeqCst);
                let prefix = config.prefix.clone().unwrap_or_default();
                Ok(Arc::new(MemoryStore::with_clock(context.clock.clone()).with_prefix(prefix)))
            }
        };

        let manager = CacheManager::builder(config())
            .with_driver("file", Arc::new(factory))
            .build();

        let files = manager.store(Some("files")).await.unwrap();
        manager.store(Some("files")).await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(files.store().prefix(), "app_");
    }

    #[tokio::test]
    async fn test_custom_driver_overrides_builtin() {
        let factory = |_: &CacheContext, _: &StoreConfig| -> CacheResult<Arc<dyn CacheStore>> {
            Ok(Arc::new(NullStore::new()))
        };
        let mut drivers = DriverRegistry::new();
        drivers.register("memory", Arc::new(factory));
        assert!(drivers.contains("memory"));

        let manager = CacheManager::builder(config()).with_drivers(drivers).build();
        let store = manager.default_store().await.unwrap();
        assert_eq!(store.store().store_type(), "null");
    }

    #[tokio::test]
    async fn test_repositories_share_events_and_clock() {
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = {
            let seen = seen.clone();
            move |_: &CacheEvent| {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        };
        let clock = ManualClock::new();
        let manager = CacheManager::builder(config())
            .with_events(Arc::new(sink))
            .with_clock(Arc::new(clock.clone()))
            .build();

        let cache = manager.default_store().await.unwrap();
        cache.put("k", &1, 1).await.unwrap();
        assert!(cache.has("k").await.unwrap());

        clock.advance(std::time::Duration::from_secs(60));
        assert!(!cache.has("k").await.unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
