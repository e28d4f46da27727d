//! Cache configuration types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Configuration of all cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Name of the store used when none is requested.
    pub default: String,

    /// Prefix for stores that do not set their own
    #[serde(default)]
    pub prefix: String,

    /// Stores by name
    #[serde(default)]
    pub stores: HashMap<String, StoreConfig>,
}

impl CacheConfig {
    /// Create a configuration whose default store is `default`.
    ///
    /// # Examples
    ///
    /// ```
    /// use keystone_cache::{CacheConfig, StoreConfig};
    ///
    /// let config = CacheConfig::new("redis")
    ///     .with_prefix("app")
    ///     .with_store("redis", StoreConfig::redis("local"))
    ///     .with_store("memory", StoreConfig::memory());
    ///
    /// assert_eq!(config.store("redis").unwrap().driver, "redis");
    /// ```
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            prefix: String::new(),
            stores: HashMap::new(),
        }
    }

    /// Load configuration from the environment.
    ///
    /// `CACHE_STORE` selects the default store (`memory` when unset) and
    /// `CACHE_PREFIX` the global prefix. One store per built-in driver is
    /// defined; `CACHE_TABLE` and `CACHE_REDIS_CONNECTION` override the
    /// database table and Redis connection names.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let table = var("CACHE_TABLE").unwrap_or_else(|| "cache".to_string());
        let connection = var("CACHE_REDIS_CONNECTION").unwrap_or_else(|| "local".to_string());

        let mut config = Self::new(var("CACHE_STORE").unwrap_or_else(|| "memory".to_string()))
            .with_store("null", StoreConfig::null())
            .with_store("memory", StoreConfig::memory())
            .with_store("database", StoreConfig::database(table))
            .with_store("redis", StoreConfig::redis(connection));

        if let Some(prefix) = var("CACHE_PREFIX") {
            config = config.with_prefix(prefix);
        }

        config
    }

    /// Set the global prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Define a store.
    pub fn with_store(mut self, name: impl Into<String>, store: StoreConfig) -> Self {
        self.stores.insert(name.into(), store);
        self
    }

    /// Configuration of the store `name`.
    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.get(name)
    }

    /// Prefix `store` should use: its own, else the global one.
    pub fn prefix_for<'a>(&'a self, store: &'a StoreConfig) -> &'a str {
        store.prefix.as_deref().unwrap_or(self.prefix.as_str())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new("memory").with_store("memory", StoreConfig::memory())
    }
}

/// Configuration of one store.
///
/// Besides `driver` and `prefix`, every field is a driver-specific option:
///
/// | driver     | options                                      |
/// |------------|----------------------------------------------|
/// | `null`     |                                              |
/// | `memory`   |                                              |
/// | `database` | `table`, `connection`, `gc_probability`      |
/// | `redis`    | `connection` (default `local`)               |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Driver name
    pub driver: String,

    /// Key prefix, overriding the global one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Driver-specific options
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl StoreConfig {
    /// Store using `driver` with no options.
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            prefix: None,
            options: Map::new(),
        }
    }

    /// A store that keeps nothing.
    pub fn null() -> Self {
        Self::new("null")
    }

    /// An in-process store.
    pub fn memory() -> Self {
        Self::new("memory")
    }

    /// A store over the cache table `table`.
    pub fn database(table: impl Into<String>) -> Self {
        Self::new("database").with_option("table", table.into())
    }

    /// A store over the Redis connection `connection`.
    pub fn redis(connection: impl Into<String>) -> Self {
        Self::new("redis").with_option("connection", connection.into())
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set a driver option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// A string option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// An unsigned integer option.
    ///
    /// Numeric strings are accepted, since environment-derived configs carry
    /// everything as text.
    pub fn option_u64(&self, key: &str) -> Option<u64> {
        match self.options.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_helpers() {
        let store = StoreConfig::database("cache_entries")
            .with_prefix("app_")
            .with_option("gc_probability", 50);

        assert_eq!(store.driver, "database");
        assert_eq!(store.option_str("table"), Some("cache_entries"));
        assert_eq!(store.option_u64("gc_probability"), Some(50));
        assert_eq!(store.option_str("connection"), None);
        assert_eq!(StoreConfig::redis("queue").option_str("connection"), Some("queue"));
    }

    #[test]
    fn test_prefix_falls_back_to_global() {
        let config = CacheConfig::new("memory").with_prefix("global");
        let own = StoreConfig::memory().with_prefix("own");
        let inherited = StoreConfig::memory();

        assert_eq!(config.prefix_for(&own), "own");
        assert_eq!(config.prefix_for(&inherited), "global");
    }

    #[test]
    fn test_deserialize_flattened_options() {
        let config: CacheConfig = serde_json::from_value(json!({
            "default": "redis",
            "prefix": "app",
            "stores": {
                "redis": { "driver": "redis", "connection": "cache" },
                "db": { "driver": "database", "table": "cache", "gc_probability": "200", "prefix": "" }
            }
        }))
        .unwrap();

        assert_eq!(config.default, "redis");
        assert_eq!(config.store("redis").unwrap().option_str("connection"), Some("cache"));

        let db = config.store("db").unwrap();
        assert_eq!(db.option_u64("gc_probability"), Some(200));
        assert_eq!(config.prefix_for(db), "");
        assert!(!db.options.contains_key("driver"));
    }

    #[test]
    fn test_from_vars() {
        let vars = HashMap::from([
            ("CACHE_STORE", "redis"),
            ("CACHE_PREFIX", "shop"),
            ("CACHE_REDIS_CONNECTION", "cache"),
        ]);
        let config = CacheConfig::from_vars(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.default, "redis");
        assert_eq!(config.prefix, "shop");
        assert_eq!(config.store("redis").unwrap().option_str("connection"), Some("cache"));
        assert_eq!(config.store("database").unwrap().option_str("table"), Some("cache"));
        assert!(config.store("null").is_some());
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.default, "memory");
        assert_eq!(config.store("memory"), Some(&StoreConfig::memory()));
    }
}
