//! Tagged caches.
//!
//! A tagged cache stores `key` as `hex(sha256(namespace)):key`, where the
//! namespace is derived from the current versions of its tags. Flushing
//! rotates those versions, so everything written under the old namespace
//! becomes unreachable in one step.
//!
//! On stores that track references, every write is also recorded in a set
//! per tag segment (`<prefix><segment>:standard_ref`, or `:forever_ref` for
//! forever entries) and flushing deletes the recorded keys. On other stores
//! the orphaned entries stay until their TTL passes.

use crate::error::CacheResult;
use crate::repository::{ItemKey, KeyScope, Repository};
use crate::store::{CacheStore, ReferenceKind, ReferenceStore};
use crate::tag_set::TagSet;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// A repository whose keys live in a tag namespace.
pub type TaggedCache = Repository<TaggedKeys>;

/// Key scope of a tagged cache.
#[derive(Clone)]
pub struct TaggedKeys {
    tags: TagSet,
    references: Option<Arc<dyn ReferenceStore>>,
    prefix: String,
}

impl TaggedKeys {
    /// Scope keys by `tags`.
    ///
    /// With `references`, writes are tracked and `flush` deletes them.
    /// `prefix` is the store prefix, applied to reference set keys and to the
    /// recorded entry keys.
    pub fn new(
        tags: TagSet,
        references: Option<Arc<dyn ReferenceStore>>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            tags,
            references,
            prefix: prefix.into(),
        }
    }

    /// The tag set.
    pub fn tag_set(&self) -> &TagSet {
        &self.tags
    }

    /// Whether writes are recorded in reference sets.
    pub fn is_tracked(&self) -> bool {
        self.references.is_some()
    }

    fn reference_key(&self, segment: &str, kind: ReferenceKind) -> String {
        format!("{}{}:{}", self.prefix, segment, kind.suffix())
    }

    async fn delete_references(
        &self,
        references: &dyn ReferenceStore,
        namespace: &str,
    ) -> CacheResult<()> {
        for segment in TagSet::segments(namespace) {
            for kind in [ReferenceKind::Forever, ReferenceKind::Standard] {
                let set_key = self.reference_key(segment, kind);
                let keys = references.references(&set_key).await?;
                debug!(set = %set_key, keys = keys.len(), "Deleting tagged cache entries");
                references.delete_raw(&keys).await?;
                references.delete_raw(&[set_key]).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KeyScope for TaggedKeys {
    async fn item_key(&self, key: &str) -> CacheResult<ItemKey> {
        let namespace = self.tags.namespace().await?;
        Ok(ItemKey {
            key: TagSet::namespaced_key(&namespace, key),
            namespace: Some(namespace),
        })
    }

    async fn record(&self, item: &ItemKey, kind: ReferenceKind) -> CacheResult<()> {
        let (Some(references), Some(namespace)) = (&self.references, &item.namespace) else {
            return Ok(());
        };

        let full_key = format!("{}{}", self.prefix, item.key);
        for segment in TagSet::segments(namespace) {
            references
                .add_reference(&self.reference_key(segment, kind), &full_key)
                .await?;
        }
        Ok(())
    }

    async fn flush(&self, _store: &dyn CacheStore) -> CacheResult<()> {
        if let Some(references) = &self.references {
            let namespace = self.tags.namespace().await?;
            self.delete_references(references.as_ref(), &namespace).await?;
        }
        self.tags.reset().await
    }

    fn tag_names(&self) -> Option<&[String]> {
        Some(self.tags.names())
    }
}

impl Repository<TaggedKeys> {
    /// Store key `key` currently resolves to.
    pub async fn tagged_item_key(&self, key: &str) -> CacheResult<String> {
        Ok(self.scope().item_key(key).await?.key)
    }

    /// The tags of this cache.
    pub fn tag_set(&self) -> &TagSet {
        self.scope().tag_set()
    }
}
