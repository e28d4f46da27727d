//! Named Redis connections.

use crate::{RedisConfig, RedisError, Result};
use redis::Client;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Registry of named Redis connections.
///
/// Connections are opened on first use and then shared. A
/// [`ConnectionManager`] reconnects on its own, so one per name is enough.
pub struct RedisConnections {
    configs: HashMap<String, RedisConfig>,
    open: Mutex<HashMap<String, ConnectionManager>>,
}

impl RedisConnections {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            configs: HashMap::new(),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with a single connection configured from the environment.
    pub fn from_env(name: impl Into<String>) -> Self {
        Self::new().with_connection(name, RedisConfig::from_env().build())
    }

    /// Register a connection.
    pub fn with_connection(mut self, name: impl Into<String>, config: RedisConfig) -> Self {
        self.configs.insert(name.into(), config);
        self
    }

    /// Configuration registered as `name`.
    pub fn config(&self, name: &str) -> Option<&RedisConfig> {
        self.configs.get(name)
    }

    /// Names of all registered connections.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    /// Connection registered as `name`, opening it if needed.
    pub async fn connection(&self, name: &str) -> Result<ConnectionManager> {
        let config = self
            .configs
            .get(name)
            .ok_or_else(|| RedisError::UnknownConnection(name.to_string()))?;

        let mut open = self.open.lock().await;
        if let Some(connection) = open.get(name) {
            return Ok(connection.clone());
        }

        let connection = connect(config).await?;
        info!(connection = %name, url = %config.url, "Opened Redis connection");
        open.insert(name.to_string(), connection.clone());
        Ok(connection)
    }
}

impl Default for RedisConnections {
    fn default() -> Self {
        Self::new()
    }
}

async fn connect(config: &RedisConfig) -> Result<ConnectionManager> {
    debug!(url = %config.url, "Connecting to Redis");

    let client = Client::open(config.connection_url())
        .map_err(|e| RedisError::Config(e.to_string()))?;

    tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
        .await
        .map_err(|_| RedisError::Timeout(config.connection_timeout))?
        .map_err(|e| RedisError::Connection(e.to_string()))
}
