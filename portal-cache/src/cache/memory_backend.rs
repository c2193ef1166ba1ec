//! Bounded in-memory cache tier.
//!
//! Values are stored type-erased behind `Arc<dyn Any>` so hits cost one clone
//! and no deserialization. The kind in the key already pins the concrete
//! type; a downcast failure means two types claim the same kind and is
//! treated as a miss.

use std::any::Any;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use lru::LruCache;
use portal_core::{CacheError, ConfigError, EntityIdentity, EntityKind, PortalResult};

use super::kind_key::KindScopedKey;
use super::traits::{CacheBackend, CacheStats, CacheableEntity};

type StoredValue = Arc<dyn Any + Send + Sync>;

struct MemoryInner {
    entries: LruCache<KindScopedKey, StoredValue>,
    stats: CacheStats,
}

/// LRU-bounded in-memory cache.
///
/// Holds at most `capacity` entities across all kinds; the least recently
/// used entry is evicted when a new one is inserted at capacity.
pub struct MemoryCacheBackend {
    inner: Mutex<MemoryInner>,
    capacity: NonZeroUsize,
}

impl MemoryCacheBackend {
    /// Create a memory tier holding at most `capacity` entities.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| ConfigError::InvalidValue {
            field: "max_memcache_size".to_string(),
            value: capacity.to_string(),
            reason: "must be greater than zero".to_string(),
        })?;

        // `LruCache::new` reserves every slot up front; grow on demand instead.
        let mut entries = LruCache::unbounded();
        entries.resize(capacity);

        Ok(Self {
            inner: Mutex::new(MemoryInner {
                entries,
                stats: CacheStats::default(),
            }),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entry exists for `(kind, id)`. Does not touch LRU order.
    pub fn contains(&self, kind: EntityKind, id: &EntityIdentity) -> bool {
        self.lock()
            .map(|inner| {
                inner
                    .entries
                    .contains(&KindScopedKey::new(kind, id.clone()))
            })
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, CacheError> {
        self.inner.lock().map_err(|_| CacheError::LockPoisoned)
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get_many<T: CacheableEntity>(
        &self,
        ids: &[EntityIdentity],
    ) -> PortalResult<HashMap<EntityIdentity, T>> {
        let kind = T::kind();
        let mut inner = self.lock()?;
        let mut found = HashMap::with_capacity(ids.len());

        for id in ids {
            let key = KindScopedKey::new(kind, id.clone());
            let value = inner
                .entries
                .get(&key)
                .and_then(|stored| stored.downcast_ref::<T>().cloned());

            match value {
                Some(entity) => {
                    inner.stats.hits += 1;
                    found.insert(id.clone(), entity);
                }
                None => {
                    if inner.entries.contains(&key) {
                        tracing::warn!(
                            kind = %kind,
                            id = %id,
                            "Cached value has an unexpected type; treating as miss"
                        );
                    }
                    inner.stats.misses += 1;
                }
            }
        }

        Ok(found)
    }

    async fn put_many<T: CacheableEntity>(
        &self,
        entries: &HashMap<EntityIdentity, T>,
    ) -> PortalResult<()> {
        let kind = T::kind();
        let mut inner = self.lock()?;

        for (id, entity) in entries {
            let key = KindScopedKey::new(kind, id.clone());
            let value: StoredValue = Arc::new(entity.clone());
            if let Some((old_key, _)) = inner.entries.push(key.clone(), value) {
                if old_key != key {
                    inner.stats.evictions += 1;
                }
            }
        }

        Ok(())
    }

    async fn invalidate_kind(&self, kind: EntityKind) -> PortalResult<u64> {
        let mut inner = self.lock()?;
        let keys: Vec<KindScopedKey> = inner
            .entries
            .iter()
            .filter(|(key, _)| key.kind() == kind)
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0u64;
        for key in &keys {
            if inner.entries.pop(key).is_some() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn stats(&self) -> PortalResult<CacheStats> {
        let inner = self.lock()?;
        Ok(CacheStats {
            entry_count: inner.entries.len() as u64,
            ..inner.stats.clone()
        })
    }
}
