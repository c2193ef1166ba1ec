//! Memory tier in front of an optional persistent tier.

use std::collections::HashMap;

use async_trait::async_trait;
use portal_core::{CacheConfig, ConfigError, EntityIdentity, EntityKind, PortalResult};

use super::lmdb_backend::LmdbCacheBackend;
use super::memory_backend::MemoryCacheBackend;
use super::traits::{CacheBackend, CacheStats, CacheableEntity};

/// Two-level cache: a bounded LRU in memory, backed by an LMDB directory when
/// one is configured.
///
/// Reads check memory first and only go to disk for the remainder; disk hits
/// are promoted into memory. Writes go to both tiers.
pub struct TieredCacheBackend {
    memory: MemoryCacheBackend,
    disk: Option<LmdbCacheBackend>,
}

impl TieredCacheBackend {
    /// Build the tiers described by `config`.
    ///
    /// Fails fast with a [`ConfigError`] if the config is invalid or the
    /// cache directory cannot be opened.
    pub fn open(config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let memory = MemoryCacheBackend::new(config.max_memcache_size)?;
        let disk = match config.cache_dir() {
            Some(dir) => {
                let backend = LmdbCacheBackend::new(dir, config.max_disk_size_mb).map_err(|e| {
                    ConfigError::CacheDirUnavailable {
                        path: dir.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                tracing::debug!(path = %dir.display(), "Opened persistent cache directory");
                Some(backend)
            }
            None => None,
        };

        Ok(Self { memory, disk })
    }

    /// Memory-only tiers with the given capacity.
    pub fn in_memory(capacity: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            memory: MemoryCacheBackend::new(capacity)?,
            disk: None,
        })
    }

    pub fn memory(&self) -> &MemoryCacheBackend {
        &self.memory
    }

    pub fn disk(&self) -> Option<&LmdbCacheBackend> {
        self.disk.as_ref()
    }
}

#[async_trait]
impl CacheBackend for TieredCacheBackend {
    async fn get_many<T: CacheableEntity>(
        &self,
        ids: &[EntityIdentity],
    ) -> PortalResult<HashMap<EntityIdentity, T>> {
        let mut found: HashMap<EntityIdentity, T> = self.memory.get_many(ids).await?;

        let Some(disk) = &self.disk else {
            return Ok(found);
        };

        let remaining: Vec<EntityIdentity> = ids
            .iter()
            .filter(|id| !found.contains_key(*id))
            .cloned()
            .collect();
        if remaining.is_empty() {
            return Ok(found);
        }

        let from_disk: HashMap<EntityIdentity, T> = disk.get_many(&remaining).await?;
        if !from_disk.is_empty() {
            let kind = T::kind();
            tracing::trace!(
                kind = %kind,
                promoted = from_disk.len(),
                "Promoting persistent cache hits into memory"
            );
            self.memory.put_many(&from_disk).await?;
            found.extend(from_disk);
        }

        Ok(found)
    }

    async fn put_many<T: CacheableEntity>(
        &self,
        entries: &HashMap<EntityIdentity, T>,
    ) -> PortalResult<()> {
        self.memory.put_many(entries).await?;

        // The disk tier is never evicted. A full map or a failed write leaves
        // the entities in memory only.
        if let Some(disk) = &self.disk {
            if let Err(error) = disk.put_many(entries).await {
                let kind = T::kind();
                tracing::warn!(
                    kind = %kind,
                    entries = entries.len(),
                    path = %disk.path().display(),
                    %error,
                    "Persistent cache write failed; entries kept in memory only"
                );
            }
        }
        Ok(())
    }

    async fn invalidate_kind(&self, kind: EntityKind) -> PortalResult<u64> {
        let mut removed = self.memory.invalidate_kind(kind).await?;
        if let Some(disk) = &self.disk {
            removed += disk.invalidate_kind(kind).await?;
        }
        Ok(removed)
    }

    /// Hits and misses are counted at the outer level: a disk hit after a
    /// memory miss is a hit. Entry count and evictions come from memory;
    /// stored bytes from disk.
    async fn stats(&self) -> PortalResult<CacheStats> {
        let memory = self.memory.stats().await?;
        let Some(disk) = &self.disk else {
            return Ok(memory);
        };

        let disk = disk.stats().await?;
        Ok(CacheStats {
            hits: memory.hits + disk.hits,
            misses: disk.misses,
            entry_count: memory.entry_count.max(disk.entry_count),
            memory_bytes: disk.memory_bytes,
            evictions: memory.evictions,
        })
    }

    async fn flush(&self) -> PortalResult<()> {
        if let Some(disk) = &self.disk {
            disk.flush().await?;
        }
        Ok(())
    }
}
