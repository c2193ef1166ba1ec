//! Configuration types

use crate::{ConfigError, EntityKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default number of entities held by the in-memory tier.
pub const DEFAULT_MAX_MEMCACHE_SIZE: usize = 1_000_000;

/// Default LMDB map size for the on-disk tier, in megabytes.
pub const DEFAULT_MAX_DISK_SIZE_MB: usize = 1024;

/// Bytes in one megabyte of LMDB map size.
pub const BYTES_PER_MB: usize = 1024 * 1024;

/// Server-advertised limits on bulk operations.
///
/// Deserializes directly from the `api_limits` object of the server
/// information reply, e.g. `{"get_records": 1000, "add_keywords": 500}`.
/// Unknown keys are kept so callers can inspect them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerLimits {
    limits: BTreeMap<String, usize>,
}

impl ServerLimits {
    /// No limits; every batch size is accepted.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Set the bulk-get limit for a kind.
    pub fn with_limit(mut self, kind: EntityKind, limit: usize) -> Self {
        self.limits.insert(kind.limit_key().to_string(), limit);
        self
    }

    /// Bulk-get limit for a kind, if the server advertised one.
    pub fn limit_for(&self, kind: EntityKind) -> Option<usize> {
        self.limits.get(kind.limit_key()).copied()
    }

    /// Raw limit lookup by server key.
    pub fn get(&self, key: &str) -> Option<usize> {
        self.limits.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

/// Cache configuration.
///
/// The cache directory is an explicit field rather than ambient state: the
/// on-disk tier is opened when the owning cache is constructed and flushed
/// when it is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory for the persistent tier. `None` keeps the cache in memory only.
    pub cache_dir: Option<PathBuf>,
    /// Maximum number of entities held in memory.
    pub max_memcache_size: usize,
    /// LMDB map size for the persistent tier, in megabytes.
    pub max_disk_size_mb: usize,
    /// Bulk limits enforced before any remote fetch.
    #[serde(default)]
    pub limits: ServerLimits,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_memcache_size: DEFAULT_MAX_MEMCACHE_SIZE,
            max_disk_size_mb: DEFAULT_MAX_DISK_SIZE_MB,
            limits: ServerLimits::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new in-memory cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `PORTAL_CACHE_DIR`: Directory for the persistent tier (default: unset, memory only)
    /// - `PORTAL_MAX_MEMCACHE_SIZE`: Entities held in memory (default: 1000000)
    /// - `PORTAL_MAX_DISK_SIZE_MB`: LMDB map size in megabytes (default: 1024)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache_dir: std::env::var("PORTAL_CACHE_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            max_memcache_size: std::env::var("PORTAL_MAX_MEMCACHE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_memcache_size),
            max_disk_size_mb: std::env::var("PORTAL_MAX_DISK_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_disk_size_mb),
            limits: defaults.limits,
        }
    }

    /// Set the persistent cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the in-memory capacity.
    pub fn with_max_memcache_size(mut self, size: usize) -> Self {
        self.max_memcache_size = size;
        self
    }

    /// Set the LMDB map size.
    pub fn with_max_disk_size_mb(mut self, size_mb: usize) -> Self {
        self.max_disk_size_mb = size_mb;
        self
    }

    /// Set the server limits.
    pub fn with_limits(mut self, limits: ServerLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// LMDB map size in bytes, or `None` if it does not fit in `usize`.
    pub fn max_disk_size_bytes(&self) -> Option<usize> {
        self.max_disk_size_mb.checked_mul(BYTES_PER_MB)
    }

    /// Check invariants that must hold before a cache can be opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_memcache_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_memcache_size".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.cache_dir.is_some() && self.max_disk_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_disk_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero when a cache directory is set".to_string(),
            });
        }

        if self.max_disk_size_bytes().is_none() {
            return Err(ConfigError::InvalidValue {
                field: "max_disk_size_mb".to_string(),
                value: self.max_disk_size_mb.to_string(),
                reason: "map size in bytes overflows usize".to_string(),
            });
        }

        if let Some(dir) = &self.cache_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "cache_dir".to_string(),
                    value: String::new(),
                    reason: "must not be empty".to_string(),
                });
            }
            if dir.is_file() {
                return Err(ConfigError::CacheDirUnavailable {
                    path: dir.display().to_string(),
                    reason: "path exists and is a file".to_string(),
                });
            }
        }

        for (key, limit) in &self.limits.limits {
            if *limit == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("limits.{}", key),
                    value: "0".to_string(),
                    reason: "server limits must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory_only() {
        let config = CacheConfig::default();
        assert!(config.cache_dir().is_none());
        assert_eq!(config.max_memcache_size, DEFAULT_MAX_MEMCACHE_SIZE);
        assert!(config.limits.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::new()
            .with_cache_dir("/tmp/portal-cache")
            .with_max_memcache_size(10)
            .with_max_disk_size_mb(64)
            .with_limits(ServerLimits::unlimited().with_limit(EntityKind::Molecule, 250));

        assert_eq!(config.cache_dir(), Some(Path::new("/tmp/portal-cache")));
        assert_eq!(config.max_memcache_size, 10);
        assert_eq!(config.max_disk_size_mb, 64);
        assert_eq!(config.limits.limit_for(EntityKind::Molecule), Some(250));
        assert_eq!(config.limits.limit_for(EntityKind::Record), None);
    }

    #[test]
    fn test_validate_rejects_zero_memcache() {
        let err = CacheConfig::new()
            .with_max_memcache_size(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_memcache_size"));
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let err = CacheConfig::new()
            .with_limits(ServerLimits::unlimited().with_limit(EntityKind::Record, 0))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "limits.get_records"));
    }

    #[test]
    fn test_validate_rejects_overflowing_disk_size() {
        let config = CacheConfig::new().with_max_disk_size_mb(usize::MAX / 1024);
        assert_eq!(config.max_disk_size_bytes(), None);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_disk_size_mb"));

        let fits = CacheConfig::new().with_max_disk_size_mb(10);
        assert_eq!(fits.max_disk_size_bytes(), Some(10 * BYTES_PER_MB));
    }

    #[test]
    fn test_server_limits_from_api_limits_json() {
        let limits: ServerLimits = serde_json::from_str(
            r#"{"get_molecules": 1000, "get_keywords": 200, "get_records": 500, "add_keywords": 50}"#,
        )
        .unwrap();
        assert_eq!(limits.limit_for(EntityKind::Molecule), Some(1000));
        assert_eq!(limits.limit_for(EntityKind::KeywordSet), Some(200));
        assert_eq!(limits.limit_for(EntityKind::Record), Some(500));
        assert_eq!(limits.get("add_keywords"), Some(50));
    }
}
