//! Portal Test Utilities
//!
//! Shared test infrastructure for the Portal workspace:
//! - Mock remote fetchers that count and record requests
//! - Entity fixtures for molecules, keyword sets and records
//! - Proptest generators for identities and entities
//! - Tracing setup for tests

pub use portal_cache::{
    CacheableEntity, FetchRequest, FetchedEntities, IdentityFetchCache, MemoryCacheBackend,
    PortalCache, RemoteFetcher, ResolveOptions, TieredCacheBackend,
};
pub use portal_core::{
    identities, CacheConfig, EntityIdentity, EntityKind, FetchError, FieldFilter, PortalError,
    PortalResult, ResolveError, ServerLimits,
};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// TRACING
// ============================================================================

/// Install a fmt subscriber filtered by `RUST_LOG` for the current test binary.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("portal_cache=debug,warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// ENTITY FIXTURES
// ============================================================================

/// Minimal molecule as returned by the molecules bulk-get endpoint.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Molecule {
    pub id: i64,
    pub name: String,
    pub symbols: Vec<String>,
    pub geometry: Vec<f64>,
    pub molecular_charge: f64,
    pub molecular_multiplicity: u32,
}

impl CacheableEntity for Molecule {
    fn kind() -> EntityKind {
        EntityKind::Molecule
    }
}

/// Keyword set: a bag of program options.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KeywordSet {
    pub id: i64,
    pub values: BTreeMap<String, serde_json::Value>,
}

impl CacheableEntity for KeywordSet {
    fn kind() -> EntityKind {
        EntityKind::KeywordSet
    }
}

/// Computation record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Record {
    pub id: i64,
    pub record_type: String,
    pub status: String,
    pub molecule_id: i64,
}

impl CacheableEntity for Record {
    fn kind() -> EntityKind {
        EntityKind::Record
    }
}

pub mod fixtures {
    //! Pre-built entities for common scenarios.

    use super::*;

    /// Water, with a deterministic geometry offset by `id`.
    pub fn molecule(id: i64) -> Molecule {
        let shift = id as f64 * 0.01;
        Molecule {
            id,
            name: format!("water-{}", id),
            symbols: vec!["O".to_string(), "H".to_string(), "H".to_string()],
            geometry: vec![
                0.0, 0.0, shift, //
                0.0, 1.43, -1.1, //
                0.0, -1.43, -1.1,
            ],
            molecular_charge: 0.0,
            molecular_multiplicity: 1,
        }
    }

    pub fn keyword_set(id: i64) -> KeywordSet {
        let mut values = BTreeMap::new();
        values.insert("maxiter".to_string(), serde_json::json!(100 + id));
        values.insert("scf_type".to_string(), serde_json::json!("df"));
        KeywordSet { id, values }
    }

    pub fn record(id: i64) -> Record {
        Record {
            id,
            record_type: "singlepoint".to_string(),
            status: "complete".to_string(),
            molecule_id: id,
        }
    }

    /// Remote side holding molecules `ids`.
    pub fn molecule_remote(ids: impl IntoIterator<Item = i64>) -> MockRemote<Molecule> {
        MockRemote::new(ids.into_iter().map(molecule))
    }

    pub fn keyword_remote(ids: impl IntoIterator<Item = i64>) -> MockRemote<KeywordSet> {
        MockRemote::new(ids.into_iter().map(keyword_set))
    }

    pub fn record_remote(ids: impl IntoIterator<Item = i64>) -> MockRemote<Record> {
        MockRemote::new(ids.into_iter().map(record))
    }

    /// Memory-only cache over a small LRU.
    pub fn memory_resolver(capacity: usize) -> IdentityFetchCache<MemoryCacheBackend> {
        let backend = MemoryCacheBackend::new(capacity)
            .unwrap_or_else(|e| panic!("fixture capacity must be valid: {}", e));
        IdentityFetchCache::with_backend(std::sync::Arc::new(backend))
    }
}

// ============================================================================
// MOCK REMOTE
// ============================================================================

/// Entities that can report their own identity.
pub trait Identified {
    fn identity(&self) -> EntityIdentity;
}

impl Identified for Molecule {
    fn identity(&self) -> EntityIdentity {
        self.id.into()
    }
}

impl Identified for KeywordSet {
    fn identity(&self) -> EntityIdentity {
        self.id.into()
    }
}

impl Identified for Record {
    fn identity(&self) -> EntityIdentity {
        self.id.into()
    }
}

/// In-process stand-in for a bulk-get endpoint.
///
/// Returns whichever requested ids it holds, counts calls, records every
/// request, and can be told to fail.
pub struct MockRemote<T> {
    entities: Mutex<HashMap<EntityIdentity, T>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
    failure: Mutex<Option<PortalError>>,
}

impl<T: CacheableEntity + Identified> MockRemote<T> {
    pub fn new(entities: impl IntoIterator<Item = T>) -> Self {
        Self {
            entities: Mutex::new(
                entities
                    .into_iter()
                    .map(|entity| (entity.identity(), entity))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Add or replace an entity on the remote side.
    pub fn insert(&self, entity: T) {
        self.entities
            .lock()
            .expect("mock remote lock")
            .insert(entity.identity(), entity);
    }

    /// Make every subsequent fetch fail with `error`.
    pub fn fail_with(&self, error: PortalError) {
        *self.failure.lock().expect("mock remote lock") = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().expect("mock remote lock") = None;
    }
}

impl<T> MockRemote<T> {
    /// Number of fetches made so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().expect("mock remote lock").clone()
    }

    pub fn last_request(&self) -> Option<FetchRequest> {
        self.requests.lock().expect("mock remote lock").last().cloned()
    }
}

#[async_trait]
impl<T: CacheableEntity + Identified> RemoteFetcher<T> for MockRemote<T> {
    async fn fetch(&self, request: &FetchRequest) -> PortalResult<FetchedEntities<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("mock remote lock")
            .push(request.clone());

        if let Some(error) = self.failure.lock().expect("mock remote lock").clone() {
            return Err(error);
        }

        let entities = self.entities.lock().expect("mock remote lock");
        Ok(request
            .ids
            .iter()
            .filter_map(|id| entities.get(id).map(|entity| (id.clone(), entity.clone())))
            .collect())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for identities and entities.

    use super::*;
    use proptest::prelude::*;

    /// Integer-like identity in a small range so that lists collide often.
    pub fn arb_small_id() -> impl Strategy<Value = i64> {
        1i64..40
    }

    pub fn arb_identity() -> impl Strategy<Value = EntityIdentity> {
        prop_oneof![
            arb_small_id().prop_map(EntityIdentity::from),
            "[a-z0-9]{1,12}".prop_map(EntityIdentity::from),
        ]
    }

    /// Request list of integer ids, duplicates likely.
    pub fn arb_id_list(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(arb_small_id(), 0..=max_len)
    }

    /// Subset of the small id range that exists remotely.
    pub fn arb_known_ids() -> impl Strategy<Value = Vec<i64>> {
        prop::collection::btree_set(arb_small_id(), 0..30)
            .prop_map(|ids| ids.into_iter().collect())
    }

    pub fn arb_molecule() -> impl Strategy<Value = Molecule> {
        (
            arb_small_id(),
            "[A-Za-z]{1,10}",
            prop::collection::vec(-10.0f64..10.0, 3..12),
            -2i32..3,
            1u32..4,
        )
            .prop_map(|(id, name, geometry, charge, multiplicity)| Molecule {
                id,
                name,
                symbols: vec!["C".to_string(); geometry.len() / 3],
                geometry,
                molecular_charge: charge as f64,
                molecular_multiplicity: multiplicity,
            })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over resolved slot lists.

    use super::*;

    /// Each slot holds the entity for the id at the same position, or `None`.
    pub fn assert_slots_align<T: Identified + std::fmt::Debug>(
        ids: &[EntityIdentity],
        slots: &[Option<T>],
    ) {
        assert_eq!(
            ids.len(),
            slots.len(),
            "expected one slot per requested id"
        );
        for (position, (id, slot)) in ids.iter().zip(slots).enumerate() {
            if let Some(entity) = slot {
                assert_eq!(
                    &entity.identity(),
                    id,
                    "slot {} holds {:?} but {} was requested",
                    position,
                    entity,
                    id
                );
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
