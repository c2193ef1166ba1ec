//! Identity-keyed fetch cache with partial-hit reconciliation.
//!
//! Every "get by id" accessor goes through [`IdentityFetchCache`]: it serves
//! what the store already has, fetches the rest in one batched call, writes
//! complete results back, and returns slots in the caller's order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use portal_core::{
    EntityIdentity, FieldFilter, PortalResult, ResolveError, ServerLimits,
};

use crate::cache::{CacheBackend, CacheableEntity};
use crate::fetcher::{FetchRequest, RemoteFetcher};

/// Per-call resolution options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Return `None` for unknown ids instead of failing.
    pub missing_ok: bool,
    /// Partial projection. Disables the cache for this call.
    pub include: Option<FieldFilter>,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn missing_ok(mut self, missing_ok: bool) -> Self {
        self.missing_ok = missing_ok;
        self
    }

    pub fn with_include(mut self, include: FieldFilter) -> Self {
        self.include = Some(include);
        self
    }

    /// Whether this call may read from and write to the store.
    pub fn uses_cache(&self) -> bool {
        self.include.is_none()
    }
}

/// Lookup-then-fetch cache over a [`CacheBackend`].
///
/// # Guarantees
///
/// - Output order matches input order, duplicates included
/// - A fully cached request makes no remote call
/// - At most one remote call per resolution, for the unique uncached ids
/// - Filtered calls neither read nor write the store
/// - Absence is never cached
pub struct IdentityFetchCache<C>
where
    C: CacheBackend,
{
    backend: Arc<C>,
    limits: ServerLimits,
}

impl<C> IdentityFetchCache<C>
where
    C: CacheBackend,
{
    pub fn new(backend: Arc<C>, limits: ServerLimits) -> Self {
        Self { backend, limits }
    }

    /// Cache with no server limits.
    pub fn with_backend(backend: Arc<C>) -> Self {
        Self::new(backend, ServerLimits::unlimited())
    }

    pub fn backend(&self) -> &C {
        &self.backend
    }

    pub fn limits(&self) -> &ServerLimits {
        &self.limits
    }

    /// Replace the server limits, e.g. after reading server information.
    pub fn set_limits(&mut self, limits: ServerLimits) {
        self.limits = limits;
    }

    /// Resolve a single identity.
    ///
    /// Returns `Ok(None)` only when the entity does not exist and
    /// `options.missing_ok` is set.
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
        let id = id.into();
        let mut resolved = self
            .resolve_many(std::slice::from_ref(&id), options, fetcher)
            .await?;
        Ok(resolved.pop().flatten())
    }

    /// Resolve a sequence of identities, one output slot per input slot.
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
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let kind = T::kind();
        let unique = unique_in_order(ids);

        let mut found: HashMap<EntityIdentity, T> = if options.uses_cache() {
            self.backend.get_many(&unique).await?
        } else {
            HashMap::new()
        };

        let to_fetch: Vec<EntityIdentity> = unique
            .iter()
            .filter(|id| !found.contains_key(*id))
            .cloned()
            .collect();

        if to_fetch.is_empty() {
            tracing::trace!(kind = %kind, requested = ids.len(), "All identities served from cache");
            return Ok(in_request_order(ids, &found));
        }

        if let Some(limit) = self.limits.limit_for(kind) {
            if to_fetch.len() > limit {
                return Err(ResolveError::LimitExceeded {
                    kind,
                    requested: to_fetch.len(),
                    limit,
                }
                .into());
            }
        }

        tracing::debug!(
            kind = %kind,
            requested = ids.len(),
            unique = unique.len(),
            cached = found.len(),
            fetching = to_fetch.len(),
            filtered = !options.uses_cache(),
            "Fetching uncached identities"
        );

        let request = FetchRequest::new(kind, to_fetch).with_include(options.include.clone());
        let fetched = fetcher.fetch(&request).await?;

        if options.uses_cache() && !fetched.is_empty() {
            self.backend.put_many(&fetched).await?;
        }

        for (id, entity) in fetched {
            found.entry(id).or_insert(entity);
        }

        let missing: Vec<EntityIdentity> = unique
            .iter()
            .filter(|id| !found.contains_key(*id))
            .cloned()
            .collect();

        if !missing.is_empty() {
            if !options.missing_ok {
                return Err(ResolveError::NotFound { kind, missing }.into());
            }
            tracing::debug!(kind = %kind, missing = missing.len(), "Identities not found; returning absent slots");
        }

        Ok(in_request_order(ids, &found))
    }
}

impl<C> Clone for IdentityFetchCache<C>
where
    C: CacheBackend,
{
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            limits: self.limits.clone(),
        }
    }
}

/// Deduplicate while keeping first-occurrence order.
fn unique_in_order(ids: &[EntityIdentity]) -> Vec<EntityIdentity> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

fn in_request_order<T: Clone>(
    ids: &[EntityIdentity],
    found: &HashMap<EntityIdentity, T>,
) -> Vec<Option<T>> {
    ids.iter().map(|id| found.get(id).cloned()).collect()
}
