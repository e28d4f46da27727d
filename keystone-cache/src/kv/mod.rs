//! Remote key/value access for the Redis store.
//!
//! The Redis store drives a [`RemoteKv`]: the handful of atomic string and
//! set commands it needs, with keys already fully qualified. With the
//! `redis` feature the trait is implemented for
//! `redis::aio::ConnectionManager`, and [`KvConnections`] for
//! `keystone_redis::RedisConnections`. [`MemoryKv`] is an in-process
//! stand-in with the same semantics.

#[cfg(feature = "redis")]
mod redis;

use crate::clock::{Clock, system_clock};
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Atomic string and set commands of a remote key/value server.
#[async_trait]
pub trait RemoteKv: Send + Sync {
    /// `GET key`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// `SET key value` without expiry.
    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// `SET key value EX seconds`.
    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> CacheResult<()>;

    /// `SET key value NX EX seconds`. Returns whether the key was set.
    async fn set_nx_ex(&self, key: &str, value: &str, seconds: u64) -> CacheResult<bool>;

    /// Add `delta` to an existing integer key.
    ///
    /// Returns `None` without creating anything if the key is absent or does
    /// not hold an integer.
    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<Option<i64>>;

    /// Subtract `delta` from an existing integer key. Same contract as
    /// [`RemoteKv::incr_by`].
    async fn decr_by(&self, key: &str, delta: i64) -> CacheResult<Option<i64>>;

    /// `DEL key [key ...]`.
    async fn del(&self, keys: &[String]) -> CacheResult<()>;

    /// `SADD key member`.
    async fn sadd(&self, key: &str, member: &str) -> CacheResult<()>;

    /// `SMEMBERS key`.
    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>>;

    /// `FLUSHDB`.
    async fn flushdb(&self) -> CacheResult<()>;
}

/// Resolves remote key/value connections by name.
#[async_trait]
pub trait KvConnections: Send + Sync {
    /// The connection registered as `name`.
    async fn connection(&self, name: &str) -> CacheResult<Arc<dyn RemoteKv>>;
}

#[derive(Debug, Clone)]
enum Slot {
    Text {
        value: String,
        expires_at: Option<f64>,
    },
    Set(BTreeSet<String>),
}

/// In-process [`RemoteKv`].
///
/// Strings expire according to the supplied clock. Wrong-type operations
/// behave like Redis: reading a set as a string fails with a backend error.
pub struct MemoryKv {
    slots: Mutex<HashMap<String, Slot>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKv {
    /// Create an empty server.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create an empty server reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Whether `key` currently exists.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.unix_seconds();
        let mut slots = self.slots.lock();
        Self::live(&mut slots, key, now).is_some()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.unix_seconds();
        let mut slots = self.slots.lock();
        slots.retain(|_, slot| !Self::expired(slot, now));
        slots.len()
    }

    /// Whether no live keys exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expired(slot: &Slot, now: f64) -> bool {
        matches!(slot, Slot::Text { expires_at: Some(at), .. } if now >= *at)
    }

    fn live<'a>(slots: &'a mut HashMap<String, Slot>, key: &str, now: f64) -> Option<&'a mut Slot> {
        if slots.get(key).is_some_and(|slot| Self::expired(slot, now)) {
            slots.remove(key);
        }
        slots.get_mut(key)
    }

    fn wrong_type(key: &str) -> CacheError {
        CacheError::Backend(format!(
            "WRONGTYPE operation against key [{key}] holding the wrong kind of value"
        ))
    }

    fn write(&self, key: &str, value: &str, expires_at: Option<f64>) {
        self.slots.lock().insert(
            key.to_string(),
            Slot::Text {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    fn adjust(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let now = self.clock.unix_seconds();
        let mut slots = self.slots.lock();
        match Self::live(&mut slots, key, now) {
            Some(Slot::Text { value, .. }) => {
                let Some(next) = value.parse::<i64>().ok().and_then(|v| v.checked_add(delta)) else {
                    return Ok(None);
                };
                *value = next.to_string();
                Ok(Some(next))
            }
            _ => Ok(None),
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteKv for MemoryKv {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = self.clock.unix_seconds();
        let mut slots = self.slots.lock();
        match Self::live(&mut slots, key, now) {
            Some(Slot::Text { value, .. }) => Ok(Some(value.clone())),
            Some(Slot::Set(_)) => Err(Self::wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.write(key, value, None);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> CacheResult<()> {
        let expires_at = self.clock.unix_seconds() + seconds as f64;
        self.write(key, value, Some(expires_at));
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, seconds: u64) -> CacheResult<bool> {
        let now = self.clock.unix_seconds();
        let mut slots = self.slots.lock();
        if Self::live(&mut slots, key, now).is_some() {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot::Text {
                value: value.to_string(),
                expires_at: Some(now + seconds as f64),
            },
        );
        Ok(true)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        self.adjust(key, delta)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        match delta.checked_neg() {
            Some(delta) => self.adjust(key, delta),
            None => Ok(None),
        }
    }

    async fn del(&self, keys: &[String]) -> CacheResult<()> {
        let mut slots = self.slots.lock();
        for key in keys {
            slots.remove(key);
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> CacheResult<()> {
        let now = self.clock.unix_seconds();
        let mut slots = self.slots.lock();
        match Self::live(&mut slots, key, now) {
            Some(Slot::Set(members)) => {
                members.insert(member.to_string());
                Ok(())
            }
            Some(Slot::Text { .. }) => Err(Self::wrong_type(key)),
            None => {
                slots.insert(
                    key.to_string(),
                    Slot::Set(BTreeSet::from([member.to_string()])),
                );
                Ok(())
            }
        }
    }

    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>> {
        let now = self.clock.unix_seconds();
        let mut slots = self.slots.lock();
        match Self::live(&mut slots, key, now) {
            Some(Slot::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(Slot::Text { .. }) => Err(Self::wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn flushdb(&self) -> CacheResult<()> {
        self.slots.lock().clear();
        Ok(())
    }
}

/// Named in-process servers, created on first use.
#[derive(Default)]
pub struct MemoryKvConnections {
    servers: Mutex<HashMap<String, Arc<MemoryKv>>>,
    clock: Option<Arc<dyn Clock>>,
}

impl MemoryKvConnections {
    /// Create an empty set of servers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Servers created from now on read time from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Get or create the server registered as `name`.
    pub fn server(&self, name: &str) -> Arc<MemoryKv> {
        self.servers
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| {
                let clock = self.clock.clone().unwrap_or_else(system_clock);
                Arc::new(MemoryKv::with_clock(clock))
            })
            .clone()
    }
}

#[async_trait]
impl KvConnections for MemoryKvConnections {
    async fn connection(&self, name: &str) -> CacheResult<Arc<dyn RemoteKv>> {
        Ok(self.server(name))
    }
}
