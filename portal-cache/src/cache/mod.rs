//! Key-value stores backing the identity fetch cache.
//!
//! Entities are immutable once created server-side, so stored entries are
//! never refreshed in place. There are no TTLs and no negative entries: a key
//! is either present with a complete entity or absent.
//!
//! # Tiers
//!
//! - [`MemoryCacheBackend`]: bounded LRU, lives for the session
//! - [`LmdbCacheBackend`]: directory-backed, survives across sessions
//! - [`TieredCacheBackend`]: memory in front of an optional LMDB directory
//!
//! All keys are built through [`KindScopedKey`], so an identity can only be
//! stored or looked up together with its [`EntityKind`](portal_core::EntityKind).

pub mod kind_key;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod tiered;
pub mod traits;

pub use kind_key::KindScopedKey;
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory_backend::MemoryCacheBackend;
pub use tiered::TieredCacheBackend;
pub use traits::{CacheBackend, CacheStats, CacheableEntity};
