//! Portal Cache - Identity-Keyed Fetch Cache
//!
//! Every "get by id" call a Portal client makes goes through this crate:
//! cached entities are served locally, the rest are fetched in one batched
//! request, and results come back in the order they were asked for.

pub mod cache;
pub mod fetcher;
pub mod resolver;
pub mod session;

pub use cache::{
    CacheBackend, CacheStats, CacheableEntity, KindScopedKey, LmdbCacheBackend, LmdbCacheError,
    MemoryCacheBackend, TieredCacheBackend,
};
pub use fetcher::{entities_from_ordered, fn_fetcher, FetchRequest, FetchedEntities, FnFetcher, RemoteFetcher};
pub use resolver::{IdentityFetchCache, ResolveOptions};
pub use session::PortalCache;
