//! Cache backend traits and cacheable entity marker.
//!
//! This module defines the traits that must be implemented by cache backends
//! and entities that can be cached.

use std::collections::HashMap;

use async_trait::async_trait;
use portal_core::{EntityIdentity, EntityKind, PortalResult};
use serde::{de::DeserializeOwned, Serialize};

/// Marker trait for types that can be cached.
///
/// The kind is a property of the type, not of the value: every instance of a
/// cacheable type lives in the same namespace.
///
/// # Implementation Requirements
///
/// - `kind()` must return the same value for the lifetime of a cache directory
/// - Implementations must be `Clone`, `Serialize`, and `DeserializeOwned` so
///   they can be written to the persistent tier
/// - Implementations must be `Send + Sync + 'static` for async compatibility
pub trait CacheableEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Namespace this type is cached under.
    fn kind() -> EntityKind;
}

/// Cache backend trait for pluggable key-value stores.
///
/// Lookups are batched: the resolver asks for every identity it needs in one
/// call and writes every freshly fetched entity in one call.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Look up entities by identity.
    ///
    /// Returns only the entries that are present; misses are silent.
    async fn get_many<T: CacheableEntity>(
        &self,
        ids: &[EntityIdentity],
    ) -> PortalResult<HashMap<EntityIdentity, T>>;

    /// Store complete entities under their identities.
    ///
    /// Existing entries for the same identity are overwritten.
    async fn put_many<T: CacheableEntity>(
        &self,
        entries: &HashMap<EntityIdentity, T>,
    ) -> PortalResult<()>;

    /// Drop every cached entry of a kind. Returns the number removed.
    async fn invalidate_kind(&self, kind: EntityKind) -> PortalResult<u64>;

    /// Get cache statistics.
    async fn stats(&self) -> PortalResult<CacheStats>;

    /// Push buffered writes to durable storage. No-op for memory stores.
    async fn flush(&self) -> PortalResult<()> {
        Ok(())
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Approximate stored size in bytes (persistent tier only).
    pub memory_bytes: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
