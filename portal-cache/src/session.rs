//! Client-scoped cache handle.
//!
//! A [`PortalCache`] lives as long as the client that owns it. Opening one
//! validates the configuration and opens the persistent directory, if any;
//! closing it flushes the persistent tier.

use std::path::Path;
use std::sync::Arc;

use portal_core::{CacheConfig, EntityIdentity, EntityKind, PortalResult, ServerLimits};

use crate::cache::{CacheBackend, CacheStats, CacheableEntity, TieredCacheBackend};
use crate::fetcher::RemoteFetcher;
use crate::resolver::{IdentityFetchCache, ResolveOptions};

/// Cache owned by one client session.
pub struct PortalCache {
    resolver: IdentityFetchCache<TieredCacheBackend>,
    config: CacheConfig,
    closed: bool,
}

impl PortalCache {
    /// Open the tiers described by `config`.
    pub fn open(config: &CacheConfig) -> PortalResult<Self> {
        let backend = TieredCacheBackend::open(config)?;
        tracing::info!(
            cache_dir = ?config.cache_dir(),
            max_memcache_size = config.max_memcache_size,
            "Portal cache opened"
        );

        Ok(Self {
            resolver: IdentityFetchCache::new(Arc::new(backend), config.limits.clone()),
            config: config.clone(),
            closed: false,
        })
    }

    /// Memory-only cache with default settings.
    pub fn in_memory() -> PortalResult<Self> {
        Self::open(&CacheConfig::new())
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.config.cache_dir()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn limits(&self) -> &ServerLimits {
        self.resolver.limits()
    }

    /// Install limits reported by the server after connecting.
    pub fn set_limits(&mut self, limits: ServerLimits) {
        self.config.limits = limits.clone();
        self.resolver.set_limits(limits);
    }

    pub fn backend(&self) -> &TieredCacheBackend {
        self.resolver.backend()
    }

    pub fn resolver(&self) -> &IdentityFetchCache<TieredCacheBackend> {
        &self.resolver
    }

    pub async fn resolve_one<T, F>(
        &self,
        id: impl Into<EntityIdentity>,
        options: &ResolveOptions,
        fetcher: &F,
    ) -> PortalResult<Option<T>>
    where
        T: CacheableEntity,
        F: RemoteFetcher<T> + ?Sized,
    {
        self.resolver.resolve_one(id, options, fetcher).await
    }

    pub async fn resolve_many<T, F>(
        &self,
        ids: &[EntityIdentity],
        options: &ResolveOptions,
        fetcher: &F,
    ) -> PortalResult<Vec<Option<T>>>
    where
        T: CacheableEntity,
        F: RemoteFetcher<T> + ?Sized,
    {
        self.resolver.resolve_many(ids, options, fetcher).await
    }

    pub async fn stats(&self) -> PortalResult<CacheStats> {
        self.backend().stats().await
    }

    /// Drop every cached entity of one kind from both tiers.
    pub async fn invalidate_kind(&self, kind: EntityKind) -> PortalResult<u64> {
        let removed = self.backend().invalidate_kind(kind).await?;
        tracing::debug!(kind = %kind, removed, "Invalidated cached entities");
        Ok(removed)
    }

    /// Flush the persistent tier and end the session.
    pub async fn close(mut self) -> PortalResult<()> {
        self.closed = true;
        self.backend().flush().await?;
        tracing::info!(cache_dir = ?self.config.cache_dir(), "Portal cache closed");
        Ok(())
    }
}

impl Drop for PortalCache {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Some(disk) = self.resolver.backend().disk() {
            if let Err(e) = disk.sync() {
                tracing::warn!(
                    path = %disk.path().display(),
                    error = %e,
                    "Failed to flush persistent cache on drop"
                );
            }
        }
    }
}

impl std::fmt::Debug for PortalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalCache")
            .field("config", &self.config)
            .field("closed", &self.closed)
            .finish()
    }
}
