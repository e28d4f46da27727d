//! [`RemoteKv`] over a Redis connection manager.

use super::{KvConnections, RemoteKv};
use crate::error::CacheResult;
use async_trait::async_trait;
use keystone_redis::RedisConnections;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::sync::Arc;

// INCRBY that leaves missing keys missing and answers nil for non-integers
static ADJUST_EXISTING: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
local result = redis.pcall('INCRBY', KEYS[1], ARGV[1])
if type(result) == 'table' and result.err then
    return false
end
return result
"#,
    )
});

// Commands are called through `AsyncCommands` explicitly: the method names
// overlap with `RemoteKv`.
#[async_trait]
impl RemoteKv for ConnectionManager {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.clone();
        let value: Option<String> = AsyncCommands::get(&mut conn, key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut conn = self.clone();
        let _: () = AsyncCommands::set(&mut conn, key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> CacheResult<()> {
        let mut conn = self.clone();
        let _: () = AsyncCommands::set_ex(&mut conn, key, value, seconds).await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, seconds: u64) -> CacheResult<bool> {
        let mut conn = self.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let mut conn = self.clone();
        let value: Option<i64> = ADJUST_EXISTING
            .key(key)
            .arg(delta)
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        match delta.checked_neg() {
            Some(delta) => self.incr_by(key, delta).await,
            None => Ok(None),
        }
    }

    async fn del(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.clone();
        let _: () = AsyncCommands::del(&mut conn, keys).await?;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> CacheResult<()> {
        let mut conn = self.clone();
        let _: () = AsyncCommands::sadd(&mut conn, key, member).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.clone();
        let members: Vec<String> = AsyncCommands::smembers(&mut conn, key).await?;
        Ok(members)
    }

    async fn flushdb(&self) -> CacheResult<()> {
        let mut conn = self.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl KvConnections for RedisConnections {
    async fn connection(&self, name: &str) -> CacheResult<Arc<dyn RemoteKv>> {
        let connection = RedisConnections::connection(self, name).await?;
        Ok(Arc::new(connection))
    }
}
