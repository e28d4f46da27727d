//! Cache repositories for Keystone.
//!
//! Provides one cache interface over several backing stores (process
//! memory, a relational table, Redis, or nothing at all) and a tagging layer
//! that invalidates groups of keys without enumerating them.
//!
//! # Features
//!
//! - `redis` - Redis bindings for the remote key/value store (enabled by default)
//! - `postgres` - Postgres bindings for the table store
//! - **Remember semantics** - compute a value once and serve it from cache
//! - **Tag-based invalidation** - version rotation plus reference tracking
//! - **Events** - hit, miss, write and forget notifications
//!
//! # Examples
//!
//! ## Repository
//!
//! ```
//! use keystone_cache::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), CacheError> {
//! let cache = Repository::new(Arc::new(MemoryStore::new()));
//!
//! cache.put("user:1", &serde_json::json!({"name": "alice"}), 10).await?;
//! let count: i64 = cache.remember("users:count", 5, || async { Ok(42) }).await?;
//!
//! assert!(cache.has("user:1").await?);
//! assert_eq!(count, 42);
//! # Ok(())
//! # }
//! ```
//!
//! ## Tag-based Invalidation
//!
//! ```
//! use keystone_cache::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), CacheError> {
//! let kv = Arc::new(MemoryKv::new());
//! let cache = Repository::new(Arc::new(RedisStore::new(kv, "app")));
//!
//! cache.tags(["users"])?.put("user:1", "alice", 10).await?;
//! cache.tags(["users"])?.flush().await?;
//!
//! assert!(!cache.tags(["users"])?.has("user:1").await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Manager
//!
//! ```
//! use keystone_cache::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), CacheError> {
//! let config = CacheConfig::new("memory")
//!     .with_prefix("app_")
//!     .with_store("memory", StoreConfig::memory());
//!
//! let manager = CacheManager::new(config);
//! let cache = manager.default_store().await?;
//! cache.forever("answer", &42).await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod expiry;
pub mod kv;
pub mod manager;
pub mod repository;
pub mod serialization;
pub mod store;
pub mod stores;
pub mod table;
pub mod tag_set;
pub mod tagged;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, StoreConfig};
pub use error::{CacheError, CacheResult};
pub use events::{CacheEvent, EventSink};
pub use expiry::Expiry;
pub use kv::{KvConnections, MemoryKv, MemoryKvConnections, RemoteKv};
pub use manager::{CacheContext, CacheManager, CacheManagerBuilder, DriverRegistry, StoreFactory};
pub use repository::{ItemKey, KeyScope, PlainKeys, Repository};
pub use store::{CacheStore, ReferenceKind, ReferenceStore, Tagging};
pub use stores::{DatabaseStore, MemoryStore, NullStore, RedisStore};
pub use table::{CacheRow, CacheTable, MemoryTable, MemoryTables, TableConnections, TableTransaction};
pub use tag_set::TagSet;
pub use tagged::{TaggedCache, TaggedKeys};

#[cfg(feature = "postgres")]
pub use table::{PgConnections, PgTable};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CacheConfig, StoreConfig};
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::events::{CacheEvent, EventSink};
    pub use crate::expiry::Expiry;
    pub use crate::kv::{MemoryKv, RemoteKv};
    pub use crate::manager::CacheManager;
    pub use crate::repository::Repository;
    pub use crate::store::CacheStore;
    pub use crate::stores::{DatabaseStore, MemoryStore, NullStore, RedisStore};
    pub use crate::tagged::TaggedCache;
}
