//! LMDB-backed persistent cache tier.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep fetched entities in a
//! directory that survives across client sessions.
//!
//! # Value Layout
//!
//! `[cached_at: i64 millis, little endian][serde_json bytes]`
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Each batched `get_many` runs in a single
//! read transaction and each `put_many` in a single write transaction.
//! Concurrent processes sharing one directory are not coordinated beyond
//! what LMDB itself provides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use portal_core::config::BYTES_PER_MB;
use portal_core::{CacheError, EntityIdentity, EntityKind, PortalResult};

use super::kind_key::KindScopedKey;
use super::traits::{CacheBackend, CacheStats, CacheableEntity};

/// Length of the timestamp header in each stored value.
const TIMESTAMP_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::EnvOpen(_) | LmdbCacheError::DbOpen(_) | LmdbCacheError::Io(_) => {
                CacheError::Open {
                    reason: e.to_string(),
                }
            }
            LmdbCacheError::Transaction(_) => CacheError::Transaction {
                reason: e.to_string(),
            },
        }
    }
}

impl From<LmdbCacheError> for portal_core::PortalError {
    fn from(e: LmdbCacheError) -> Self {
        CacheError::from(e).into()
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed cache rooted at a directory.
///
/// # Example
///
/// ```ignore
/// use portal_cache::cache::LmdbCacheBackend;
///
/// let backend = LmdbCacheBackend::new("/tmp/portal-cache", 100)?;
/// backend.put_many(&molecules).await?;
/// let cached: HashMap<EntityIdentity, Molecule> = backend.get_many(&ids).await?;
/// ```
pub struct LmdbCacheBackend {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Directory the environment lives in.
    path: PathBuf,
    /// Hit/miss counters for this process.
    stats: RwLock<CacheStats>,
}

impl LmdbCacheBackend {
    /// Open (or create) a cache directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment/database cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        let map_size = max_size_mb.checked_mul(BYTES_PER_MB).ok_or_else(|| {
            LmdbCacheError::EnvOpen(format!("map size of {} MB overflows usize", max_size_mb))
        })?;

        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per backend and the
        // directory is not otherwise memory-mapped by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            db,
            path: path.as_ref().to_path_buf(),
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Directory backing this cache.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When an entry was written, if present.
    pub fn cached_at(
        &self,
        kind: EntityKind,
        id: &EntityIdentity,
    ) -> Result<Option<DateTime<Utc>>, LmdbCacheError> {
        let key = KindScopedKey::new(kind, id.clone());
        if !key.fits_lmdb() {
            return Ok(None);
        }

        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let bytes = self.db.get(&rtxn, &key.encode()).map_err(txn_err)?;

        Ok(bytes.and_then(|bytes| decode_timestamp(bytes)))
    }

    /// Force buffered pages to disk.
    pub fn sync(&self) -> Result<(), LmdbCacheError> {
        self.env.force_sync().map_err(txn_err)
    }

    fn record(&self, hits: u64, misses: u64) {
        if let Ok(mut stats) = self.stats.write() {
            stats.hits += hits;
            stats.misses += misses;
        }
    }

    /// Collect every key that starts with `prefix`.
    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;

        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(txn_err)? {
            let (key, _) = result.map_err(txn_err)?;
            if key.starts_with(prefix) {
                keys.push(key.to_vec());
            }
        }

        Ok(keys)
    }
}

fn decode_timestamp(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let header: [u8; TIMESTAMP_LEN] = bytes.get(..TIMESTAMP_LEN)?.try_into().ok()?;
    DateTime::from_timestamp_millis(i64::from_le_bytes(header))
}

fn encode_value(cached_at: DateTime<Utc>, json: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(TIMESTAMP_LEN + json.len());
    full.extend_from_slice(&cached_at.timestamp_millis().to_le_bytes());
    full.extend_from_slice(json);
    full
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get_many<T: CacheableEntity>(
        &self,
        ids: &[EntityIdentity],
    ) -> PortalResult<HashMap<EntityIdentity, T>> {
        let kind = T::kind();
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut found = HashMap::with_capacity(ids.len());
        let mut misses = 0u64;

        for id in ids {
            let key = KindScopedKey::new(kind, id.clone());
            if !key.fits_lmdb() {
                misses += 1;
                continue;
            }

            let Some(bytes) = self.db.get(&rtxn, &key.encode()).map_err(txn_err)? else {
                misses += 1;
                continue;
            };

            let decoded = bytes
                .get(TIMESTAMP_LEN..)
                .ok_or_else(|| "value shorter than timestamp header".to_string())
                .and_then(|json| serde_json::from_slice::<T>(json).map_err(|e| e.to_string()));

            match decoded {
                Ok(entity) => {
                    found.insert(id.clone(), entity);
                }
                Err(reason) => {
                    // Treated as a miss; the refetched entity overwrites it.
                    let error = CacheError::Deserialization {
                        kind,
                        id: id.clone(),
                        reason,
                    };
                    tracing::warn!(%error, "Skipping undecodable cache entry");
                    misses += 1;
                }
            }
        }

        self.record(found.len() as u64, misses);
        Ok(found)
    }

    async fn put_many<T: CacheableEntity>(
        &self,
        entries: &HashMap<EntityIdentity, T>,
    ) -> PortalResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let kind = T::kind();
        let cached_at = Utc::now();
        let mut encoded = Vec::with_capacity(entries.len());

        for (id, entity) in entries {
            let key = KindScopedKey::new(kind, id.clone());
            if !key.fits_lmdb() {
                tracing::warn!(kind = %kind, id = %id, "Identity too long for persistent cache; skipping");
                continue;
            }

            let json = serde_json::to_vec(entity).map_err(|e| CacheError::Serialization {
                kind,
                id: id.clone(),
                reason: e.to_string(),
            })?;
            encoded.push((key.encode(), encode_value(cached_at, &json)));
        }

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut written = 0u64;
        for (key, value) in &encoded {
            self.db.put(&mut wtxn, key, value).map_err(txn_err)?;
            written += value.len() as u64;
        }
        wtxn.commit().map_err(txn_err)?;

        if let Ok(mut stats) = self.stats.write() {
            stats.memory_bytes += written;
        }

        Ok(())
    }

    async fn invalidate_kind(&self, kind: EntityKind) -> PortalResult<u64> {
        let keys = self.collect_keys_with_prefix(&KindScopedKey::kind_prefix(kind))?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in &keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;

        Ok(deleted)
    }

    async fn stats(&self) -> PortalResult<CacheStats> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let entry_count = self.db.len(&rtxn).map_err(txn_err)?;
        let stats = self.stats.read().map_err(|_| CacheError::LockPoisoned)?;

        Ok(CacheStats {
            entry_count,
            ..stats.clone()
        })
    }

    async fn flush(&self) -> PortalResult<()> {
        self.sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct KeywordSet {
        values: HashMap<String, String>,
    }

    impl CacheableEntity for KeywordSet {
        fn kind() -> EntityKind {
            EntityKind::KeywordSet
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Molecule {
        formula: String,
    }

    impl CacheableEntity for Molecule {
        fn kind() -> EntityKind {
            EntityKind::Molecule
        }
    }

    fn create_test_backend() -> (LmdbCacheBackend, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend =
            LmdbCacheBackend::new(temp_dir.path(), 10).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    fn keyword_set(method: &str) -> KeywordSet {
        KeywordSet {
            values: [("method".to_string(), method.to_string())].into_iter().collect(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_many() {
        let (backend, _dir) = create_test_backend();

        let entries: HashMap<EntityIdentity, KeywordSet> = [
            (EntityIdentity::from(1i64), keyword_set("b3lyp")),
            (EntityIdentity::from(2i64), keyword_set("mp2")),
        ]
        .into_iter()
        .collect();
        backend.put_many(&entries).await.expect("put should succeed");

        let ids = portal_core::identities([1i64, 2, 3]);
        let found: HashMap<EntityIdentity, KeywordSet> =
            backend.get_many(&ids).await.expect("get should succeed");

        assert_eq!(found.len(), 2);
        assert_eq!(found[&EntityIdentity::from(2i64)], keyword_set("mp2"));

        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 2);
        assert!(stats.memory_bytes > 0);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let id = EntityIdentity::from(9i64);

        {
            let backend = LmdbCacheBackend::new(temp_dir.path(), 10).expect("open");
            let entries: HashMap<EntityIdentity, Molecule> = [(
                id.clone(),
                Molecule {
                    formula: "H2O".to_string(),
                },
            )]
            .into_iter()
            .collect();
            backend.put_many(&entries).await.expect("put");
            backend.flush().await.expect("flush");
        }

        let reopened = LmdbCacheBackend::new(temp_dir.path(), 10).expect("reopen");
        let found: HashMap<EntityIdentity, Molecule> =
            reopened.get_many(&[id.clone()]).await.expect("get");
        assert_eq!(found[&id].formula, "H2O");
        assert!(reopened
            .cached_at(EntityKind::Molecule, &id)
            .expect("cached_at")
            .is_some());
    }

    #[tokio::test]
    async fn test_kind_isolation() {
        let (backend, _dir) = create_test_backend();
        let id = EntityIdentity::from(4i64);
        let entries: HashMap<EntityIdentity, Molecule> = [(
            id.clone(),
            Molecule {
                formula: "CH4".to_string(),
            },
        )]
        .into_iter()
        .collect();
        backend.put_many(&entries).await.expect("put");

        let found: HashMap<EntityIdentity, KeywordSet> =
            backend.get_many(&[id]).await.expect("get");
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_kind() {
        let (backend, _dir) = create_test_backend();

        let molecules: HashMap<EntityIdentity, Molecule> = (1..=3i64)
            .map(|i| {
                (
                    EntityIdentity::from(i),
                    Molecule {
                        formula: format!("C{}", i),
                    },
                )
            })
            .collect();
        backend.put_many(&molecules).await.expect("put");

        let keywords: HashMap<EntityIdentity, KeywordSet> =
            [(EntityIdentity::from(1i64), keyword_set("hf"))]
                .into_iter()
                .collect();
        backend.put_many(&keywords).await.expect("put");

        let deleted = backend
            .invalidate_kind(EntityKind::Molecule)
            .await
            .expect("invalidate");
        assert_eq!(deleted, 3);

        let stats = backend.stats().await.expect("stats");
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_overlong_identity_is_skipped() {
        let (backend, _dir) = create_test_backend();
        let id = EntityIdentity::from("x".repeat(600));
        let entries: HashMap<EntityIdentity, Molecule> = [(
            id.clone(),
            Molecule {
                formula: "He".to_string(),
            },
        )]
        .into_iter()
        .collect();

        backend.put_many(&entries).await.expect("put should not fail");
        let found: HashMap<EntityIdentity, Molecule> = backend.get_many(&[id]).await.expect("get");
        assert!(found.is_empty());
    }

    #[test]
    fn test_overflowing_map_size_is_an_open_error() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let err = LmdbCacheBackend::new(temp_dir.path().join("huge"), usize::MAX / 1024)
            .err()
            .expect("map size overflow should fail");

        assert!(matches!(err, LmdbCacheError::EnvOpen(_)));
        assert!(!temp_dir.path().join("huge").exists());
    }

    #[test]
    fn test_value_layout_roundtrip() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_123).expect("valid timestamp");
        let value = encode_value(now, b"{}");
        assert_eq!(value.len(), TIMESTAMP_LEN + 2);
        assert_eq!(decode_timestamp(&value), Some(now));
        assert_eq!(decode_timestamp(&value[..4]), None);
    }
}
