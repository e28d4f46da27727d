//! Built-in cache stores.

mod database;
mod memory;
mod null;
mod redis;

pub use database::{DEFAULT_GC_PROBABILITY, DatabaseStore};
pub use memory::MemoryStore;
pub use null::NullStore;
pub use redis::RedisStore;
