//! # Keystone Redis
//!
//! Named Redis connections for Keystone.
//!
//! ## Features
//!
//! - **Configuration**: URL, credentials, database and timeouts, loadable
//!   from `REDIS_*` environment variables
//! - **Named Connections**: connections registered by name and opened lazily
//! - **Reconnection**: each connection is a `redis::aio::ConnectionManager`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keystone_redis::{RedisConfig, RedisConnections};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connections = RedisConnections::new().with_connection(
//!         "local",
//!         RedisConfig::builder().url("redis://localhost:6379").database(1).build(),
//!     );
//!
//!     let mut conn = connections.connection("local").await?;
//!     let _: () = redis::cmd("SET").arg("key").arg("value").query_async(&mut conn).await?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod connections;
mod error;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use connections::RedisConnections;
pub use error::{RedisError, Result};

// Re-export redis crate for convenience
pub use redis;
pub use redis::aio::ConnectionManager;
