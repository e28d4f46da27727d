//! Postgres cache table over `sqlx`.

use super::{CacheRow, CacheTable, TableConnections, TableTransaction};
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Cache table stored in Postgres.
///
/// The table is expected to look like:
///
/// ```sql
/// CREATE TABLE cache (
///     key TEXT PRIMARY KEY,
///     value TEXT NOT NULL,
///     expiration BIGINT NOT NULL
/// );
/// ```
#[derive(Clone)]
pub struct PgTable {
    pool: PgPool,
    table: String,
}

impl PgTable {
    /// Use `table` on the given pool.
    ///
    /// The table name is interpolated into statements and must be a plain
    /// identifier.
    pub fn new(pool: PgPool, table: impl Into<String>) -> CacheResult<Self> {
        let table = table.into();
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !valid {
            return Err(CacheError::Config(format!("invalid cache table name: {table}")));
        }
        Ok(Self { pool, table })
    }

    /// Create the cache table if it does not exist.
    pub async fn create_table(&self) -> CacheResult<()> {
        debug!(table = %self.table, "Creating cache table");
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL, expiration BIGINT NOT NULL)",
            self.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn to_row(row: PgRow) -> CacheResult<CacheRow> {
    Ok(CacheRow {
        key: row.try_get("key")?,
        value: row.try_get("value")?,
        expiration: row.try_get("expiration")?,
    })
}

#[async_trait]
impl CacheTable for PgTable {
    async fn find(&self, key: &str) -> CacheResult<Option<CacheRow>> {
        let row = sqlx::query(&format!(
            "SELECT key, value, expiration FROM {} WHERE key = $1",
            self.table
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(to_row).transpose()
    }

    async fn upsert(&self, row: CacheRow) -> CacheResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (key, value, expiration) VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expiration = EXCLUDED.expiration",
            self.table
        ))
        .bind(&row.key)
        .bind(&row.value)
        .bind(row.expiration)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE key = $1", self.table))
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_key(&self, key: &str, expiration: i64) -> CacheResult<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE key = $1 AND expiration = $2",
            self.table
        ))
        .bind(key)
        .bind(expiration)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_prefixed(&self, prefix: &str) -> CacheResult<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE left(key, char_length($1)) = $1",
            self.table
        ))
        .bind(prefix)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: i64) -> CacheResult<u64> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE expiration <= $1", self.table))
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> CacheResult<Box<dyn TableTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction {
            tx,
            table: self.table.clone(),
        }))
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    table: String,
}

#[async_trait]
impl TableTransaction for PgTransaction {
    async fn find_for_update(&mut self, key: &str) -> CacheResult<Option<CacheRow>> {
        let row = sqlx::query(&format!(
            "SELECT key, value, expiration FROM {} WHERE key = $1 FOR UPDATE",
            self.table
        ))
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(to_row).transpose()
    }

    async fn update_value(&mut self, key: &str, value: &str) -> CacheResult<()> {
        sqlx::query(&format!("UPDATE {} SET value = $1 WHERE key = $2", self.table))
            .bind(value)
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CacheResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Named Postgres pools.
#[derive(Clone, Default)]
pub struct PgConnections {
    pools: HashMap<String, PgPool>,
    default: Option<String>,
}

impl PgConnections {
    /// Create an empty set of connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named pool. The first pool registered is the default.
    pub fn with_pool(mut self, name: impl Into<String>, pool: PgPool) -> Self {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.pools.insert(name, pool);
        self
    }
}

#[async_trait]
impl TableConnections for PgConnections {
    async fn table(&self, connection: Option<&str>, table: &str) -> CacheResult<Arc<dyn CacheTable>> {
        let name = connection
            .or(self.default.as_deref())
            .ok_or_else(|| CacheError::Config("no database connection registered".to_string()))?;
        let pool = self
            .pools
            .get(name)
            .ok_or_else(|| CacheError::Config(format!("database connection [{name}] is not registered")))?;
        Ok(Arc::new(PgTable::new(pool.clone(), table)?))
    }
}
