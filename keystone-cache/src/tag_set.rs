//! Versioned tags.
//!
//! Each tag name maps to an opaque random version stored without expiry
//! under `tag:<name>:key`. A tag set's namespace is the list of its current
//! versions, so resetting any member moves every key of the set into a new
//! namespace at once.

use crate::error::CacheResult;
use crate::store::CacheStore;
use futures::future::try_join_all;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

const SEGMENT_SEPARATOR: char = '|';

/// An ordered set of tag names over a store.
///
/// Order is significant: `["a", "b"]` and `["b", "a"]` are different
/// namespaces.
#[derive(Clone)]
pub struct TagSet {
    store: Arc<dyn CacheStore>,
    names: Vec<String>,
}

impl TagSet {
    /// Create a tag set.
    pub fn new<I, S>(store: Arc<dyn CacheStore>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Tag names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Give every tag a fresh version.
    pub async fn reset(&self) -> CacheResult<()> {
        try_join_all(self.names.iter().map(|name| self.reset_tag(name))).await?;
        Ok(())
    }

    /// Current version of `name`, creating one if the tag has none yet.
    pub async fn tag_id(&self, name: &str) -> CacheResult<String> {
        match self.store.get(&Self::tag_key(name)).await? {
            Some(Value::String(id)) => Ok(id),
            Some(other) => Ok(other.to_string()),
            None => self.reset_tag(name).await,
        }
    }

    /// Current versions of all tags, in order.
    pub async fn tag_ids(&self) -> CacheResult<Vec<String>> {
        let mut ids = Vec::with_capacity(self.names.len());
        for name in &self.names {
            ids.push(self.tag_id(name).await?);
        }
        Ok(ids)
    }

    /// Namespace of the set: current versions joined with `|`.
    ///
    /// Recomputed on every call so a reset by another process is seen
    /// immediately.
    pub async fn namespace(&self) -> CacheResult<String> {
        Ok(self.tag_ids().await?.join(&SEGMENT_SEPARATOR.to_string()))
    }

    /// Store a new random version for `name` and return it.
    pub async fn reset_tag(&self, name: &str) -> CacheResult<String> {
        let id = hex::encode(rand::random::<[u8; 8]>());
        self.store
            .forever(&Self::tag_key(name), &Value::String(id.clone()))
            .await?;
        debug!(tag = %name, "Reset cache tag");
        Ok(id)
    }

    /// Key the version of `name` is stored under.
    pub fn tag_key(name: &str) -> String {
        format!("tag:{name}:key")
    }

    /// Split a namespace back into its per-tag segments.
    pub fn segments(namespace: &str) -> impl Iterator<Item = &str> {
        namespace.split(SEGMENT_SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Item key for `key` under `namespace`: `hex(sha256(namespace)):key`.
    pub fn namespaced_key(namespace: &str, key: &str) -> String {
        let digest = Sha256::digest(namespace.as_bytes());
        format!("{}:{}", hex::encode(digest), key)
    }
}

impl std::fmt::Debug for TagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagSet")
            .field("store", &self.store.store_type())
            .field("names", &self.names)
            .finish()
    }
}
