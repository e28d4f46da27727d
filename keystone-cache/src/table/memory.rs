//! In-process cache table.

use super::{CacheRow, CacheTable, TableConnections, TableTransaction};
use crate::error::CacheResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Rows = BTreeMap<String, CacheRow>;

/// Cache table held in memory.
///
/// A transaction locks the whole table until it commits or is dropped, which
/// gives the same exclusion a row lock gives for a single counter. Updates
/// made inside a transaction are only applied on commit.
#[derive(Clone, Default)]
pub struct MemoryTable {
    rows: Arc<Mutex<Rows>>,
}

impl MemoryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, expired ones included.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    /// Whether the table has no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    /// Snapshot of all rows ordered by key.
    pub async fn rows(&self) -> Vec<CacheRow> {
        self.rows.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl CacheTable for MemoryTable {
    async fn find(&self, key: &str) -> CacheResult<Option<CacheRow>> {
        Ok(self.rows.lock().await.get(key).cloned())
    }

    async fn upsert(&self, row: CacheRow) -> CacheResult<()> {
        self.rows.lock().await.insert(row.key.clone(), row);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        Ok(self.rows.lock().await.remove(key).map_or(0, |_| 1))
    }

    async fn delete_expired_key(&self, key: &str, expiration: i64) -> CacheResult<u64> {
        let mut rows = self.rows.lock().await;
        match rows.get(key) {
            Some(row) if row.expiration == expiration => {
                rows.remove(key);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_prefixed(&self, prefix: &str) -> CacheResult<u64> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|key, _| !key.starts_with(prefix));
        Ok((before - rows.len()) as u64)
    }

    async fn delete_expired(&self, now: i64) -> CacheResult<u64> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|_, row| row.expiration > now);
        Ok((before - rows.len()) as u64)
    }

    async fn begin(&self) -> CacheResult<Box<dyn TableTransaction>> {
        let guard = self.rows.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            rows: guard,
            pending: Vec::new(),
        }))
    }
}

struct MemoryTransaction {
    rows: OwnedMutexGuard<Rows>,
    pending: Vec<(String, String)>,
}

#[async_trait]
impl TableTransaction for MemoryTransaction {
    async fn find_for_update(&mut self, key: &str) -> CacheResult<Option<CacheRow>> {
        let mut row = self.rows.get(key).cloned();
        if let Some(row) = row.as_mut() {
            // Reads inside the transaction observe its own pending writes
            if let Some((_, value)) = self.pending.iter().rev().find(|(k, _)| k == key) {
                row.value = value.clone();
            }
        }
        Ok(row)
    }

    async fn update_value(&mut self, key: &str, value: &str) -> CacheResult<()> {
        self.pending.push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> CacheResult<()> {
        let pending = std::mem::take(&mut self.pending);
        for (key, value) in pending {
            if let Some(row) = self.rows.get_mut(&key) {
                row.value = value;
            }
        }
        Ok(())
    }
}

/// Named in-memory tables, created on first use.
#[derive(Default)]
pub struct MemoryTables {
    tables: DashMap<String, MemoryTable>,
}

impl MemoryTables {
    /// Create an empty set of tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a table.
    pub fn get(&self, connection: Option<&str>, table: &str) -> MemoryTable {
        let name = format!("{}/{}", connection.unwrap_or("default"), table);
        self.tables.entry(name).or_default().clone()
    }
}

#[async_trait]
impl TableConnections for MemoryTables {
    async fn table(&self, connection: Option<&str>, table: &str) -> CacheResult<Arc<dyn CacheTable>> {
        Ok(Arc::new(self.get(connection, table)))
    }
}
