//! Remote fetch strategies.
//!
//! Each entity kind maps to its own bulk-get endpoint and schema, so the
//! cache does not know how to fetch anything by itself. Callers inject a
//! [`RemoteFetcher`] per call: one strategy for molecules, one for keyword
//! sets, one for records.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use portal_core::{EntityIdentity, EntityKind, FetchError, FieldFilter, PortalResult};
use serde::ser::{Serialize, Serializer};

use crate::cache::CacheableEntity;

/// Entities returned by one batched fetch, keyed by identity.
///
/// Identities the server could not find are simply absent.
pub type FetchedEntities<T> = HashMap<EntityIdentity, T>;

/// One batched bulk-get request.
///
/// Serializes to the server's bulk-get body:
///
/// ```json
/// {"meta": {"includes": ["id", "status"]}, "data": {"ids": ["1", "2"]}}
/// ```
///
/// `meta` is omitted when no field filter is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub kind: EntityKind,
    pub ids: Vec<EntityIdentity>,
    pub include: Option<FieldFilter>,
}

impl FetchRequest {
    pub fn new(kind: EntityKind, ids: Vec<EntityIdentity>) -> Self {
        Self {
            kind,
            ids,
            include: None,
        }
    }

    pub fn with_include(mut self, include: Option<FieldFilter>) -> Self {
        self.include = include;
        self
    }

    pub fn is_filtered(&self) -> bool {
        self.include.is_some()
    }
}

#[derive(serde::Serialize)]
struct BulkGetMeta<'a> {
    includes: &'a FieldFilter,
}

#[derive(serde::Serialize)]
struct BulkGetData<'a> {
    ids: &'a [EntityIdentity],
}

#[derive(serde::Serialize)]
struct BulkGetBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<BulkGetMeta<'a>>,
    data: BulkGetData<'a>,
}

impl Serialize for FetchRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BulkGetBody {
            meta: self
                .include
                .as_ref()
                .map(|includes| BulkGetMeta { includes }),
            data: BulkGetData { ids: &self.ids },
        }
        .serialize(serializer)
    }
}

/// Strategy for fetching entities of one kind from the remote service.
///
/// Errors returned here reach the caller of the cache unchanged.
#[async_trait]
pub trait RemoteFetcher<T: CacheableEntity>: Send + Sync {
    /// Fetch the requested identities in a single round trip.
    async fn fetch(&self, request: &FetchRequest) -> PortalResult<FetchedEntities<T>>;
}

/// Adapter turning an async closure into a [`RemoteFetcher`].
///
/// ```ignore
/// let get_molecules = fn_fetcher(|request: FetchRequest| async move {
///     let reply: Vec<Option<Molecule>> = transport.post("v1/molecules/bulkGet", &request).await?;
///     entities_from_ordered(&request.ids, reply)
/// });
/// ```
pub struct FnFetcher<F> {
    f: F,
}

/// Wrap an async closure as a fetch strategy.
pub fn fn_fetcher<F>(f: F) -> FnFetcher<F> {
    FnFetcher { f }
}

#[async_trait]
impl<T, F, Fut> RemoteFetcher<T> for FnFetcher<F>
where
    T: CacheableEntity,
    F: Fn(FetchRequest) -> Fut + Send + Sync,
    Fut: Future<Output = PortalResult<FetchedEntities<T>>> + Send,
{
    async fn fetch(&self, request: &FetchRequest) -> PortalResult<FetchedEntities<T>> {
        (self.f)(request.clone()).await
    }
}

/// Key an ordered bulk-get reply by the identities that were requested.
///
/// The server answers a bulk get with one slot per requested id, `null` for
/// ids it does not know. A reply of the wrong length is a decode error.
pub fn entities_from_ordered<T>(
    ids: &[EntityIdentity],
    reply: Vec<Option<T>>,
) -> PortalResult<FetchedEntities<T>> {
    if ids.len() != reply.len() {
        return Err(FetchError::Decode {
            reason: format!(
                "bulk get returned {} slots for {} ids",
                reply.len(),
                ids.len()
            ),
        }
        .into());
    }

    Ok(ids
        .iter()
        .zip(reply)
        .filter_map(|(id, entity)| entity.map(|entity| (id.clone(), entity)))
        .collect())
}
