//! Integration tests for a client-scoped `PortalCache`.
//!
//! These drive the full stack (resolver, tiered store, LMDB directory) the
//! way a client would across one or more sessions.

use portal_cache::{CacheBackend, PortalCache};
use portal_test_utils::{
    fixtures::{keyword_remote, molecule, molecule_remote, record, record_remote},
    identities, init_test_tracing, CacheConfig, EntityIdentity, EntityKind, FetchError,
    FieldFilter, KeywordSet, Molecule, PortalError, Record, ResolveError, ResolveOptions,
    ServerLimits,
};
use tempfile::TempDir;

fn disk_config(dir: &TempDir) -> CacheConfig {
    CacheConfig::new()
        .with_cache_dir(dir.path())
        .with_max_disk_size_mb(10)
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[tokio::test]
async fn test_entities_survive_reopen() {
    init_test_tracing();
    let dir = TempDir::new().expect("tempdir");
    let ids = identities([1i64, 2, 3]);

    {
        let cache = PortalCache::open(&disk_config(&dir)).expect("open");
        let remote = molecule_remote([1, 2, 3]);
        let _: Vec<Option<Molecule>> = cache
            .resolve_many(&ids, &ResolveOptions::new(), &remote)
            .await
            .expect("first session");
        assert_eq!(remote.calls(), 1);
        cache.close().await.expect("close");
    }

    let cache = PortalCache::open(&disk_config(&dir)).expect("reopen");
    let remote = molecule_remote([1, 2, 3]);
    let slots: Vec<Option<Molecule>> = cache
        .resolve_many(&ids, &ResolveOptions::new(), &remote)
        .await
        .expect("second session");

    assert_eq!(remote.calls(), 0);
    assert_eq!(
        slots,
        vec![Some(molecule(1)), Some(molecule(2)), Some(molecule(3))]
    );
}

#[tokio::test]
async fn test_drop_without_close_still_persists() {
    let dir = TempDir::new().expect("tempdir");

    {
        let cache = PortalCache::open(&disk_config(&dir)).expect("open");
        let _: Option<Record> = cache
            .resolve_one(9i64, &ResolveOptions::new(), &record_remote([9]))
            .await
            .expect("resolve");
    }

    let cache = PortalCache::open(&disk_config(&dir)).expect("reopen");
    let remote = record_remote([9]);
    let found: Option<Record> = cache
        .resolve_one(9i64, &ResolveOptions::new(), &remote)
        .await
        .expect("resolve");

    assert_eq!(found, Some(record(9)));
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn test_memory_tier_stays_bounded() {
    let dir = TempDir::new().expect("tempdir");
    let cache = PortalCache::open(&disk_config(&dir).with_max_memcache_size(3)).expect("open");
    let remote = molecule_remote(1..=10);

    let _: Vec<Option<Molecule>> = cache
        .resolve_many(&identities(1i64..=10), &ResolveOptions::new(), &remote)
        .await
        .expect("resolve");

    assert_eq!(cache.backend().memory().len(), 3);
    assert_eq!(cache.stats().await.expect("stats").evictions, 7);

    // Evicted entries are still served from disk.
    let _: Vec<Option<Molecule>> = cache
        .resolve_many(&identities(1i64..=10), &ResolveOptions::new(), &remote)
        .await
        .expect("resolve");
    assert_eq!(remote.calls(), 1);
}

#[tokio::test]
async fn test_full_disk_map_does_not_fail_resolution() {
    init_test_tracing();
    let dir = TempDir::new().expect("tempdir");
    let cache = PortalCache::open(
        &CacheConfig::new()
            .with_cache_dir(dir.path())
            .with_max_disk_size_mb(1),
    )
    .expect("open");
    let remote = molecule_remote(1..=20_000);

    for start in (1i64..=20_000).step_by(1000) {
        let ids = identities(start..start + 1000);
        let slots: Vec<Option<Molecule>> = cache
            .resolve_many(&ids, &ResolveOptions::new(), &remote)
            .await
            .unwrap_or_else(|e| panic!("batch starting {} failed: {}", start, e));
        assert!(slots.iter().all(Option::is_some));
    }
    assert_eq!(remote.calls(), 20);

    // The map filled up: not everything reached disk, but all of it is in memory.
    let on_disk = cache
        .backend()
        .disk()
        .expect("disk tier")
        .stats()
        .await
        .expect("stats")
        .entry_count;
    assert!(on_disk < 20_000);
    assert_eq!(cache.backend().memory().len(), 20_000);

    let _: Vec<Option<Molecule>> = cache
        .resolve_many(&identities(19_001i64..=20_000), &ResolveOptions::new(), &remote)
        .await
        .expect("served from memory");
    assert_eq!(remote.calls(), 20);
}

// ============================================================================
// CACHE BYPASS AND ISOLATION
// ============================================================================

#[tokio::test]
async fn test_field_filter_leaves_store_unchanged() {
    let dir = TempDir::new().expect("tempdir");
    let cache = PortalCache::open(&disk_config(&dir)).expect("open");
    let remote = record_remote([1, 2]);
    let ids = identities([1i64, 2]);

    let _: Vec<Option<Record>> = cache
        .resolve_many(&ids, &ResolveOptions::new(), &remote)
        .await
        .expect("warm");
    let before = cache.stats().await.expect("stats").entry_count;

    let filtered = ResolveOptions::new().with_include(FieldFilter::new(["status"]));
    remote.insert(Record {
        status: "error".to_string(),
        ..record(2)
    });
    let slots: Vec<Option<Record>> = cache
        .resolve_many(&ids, &filtered, &remote)
        .await
        .expect("filtered");

    assert_eq!(remote.calls(), 2);
    assert_eq!(slots[1].as_ref().map(|r| r.status.as_str()), Some("error"));
    assert_eq!(cache.stats().await.expect("stats").entry_count, before);

    // The unfiltered view still serves the originally cached entity.
    let cached: Option<Record> = cache
        .resolve_one(2i64, &ResolveOptions::new(), &remote)
        .await
        .expect("cached");
    assert_eq!(cached, Some(record(2)));
    assert_eq!(remote.calls(), 2);
}

#[tokio::test]
async fn test_kinds_never_collide() {
    let cache = PortalCache::in_memory().expect("open");
    let molecules = molecule_remote([1]);
    let keywords = keyword_remote([1]);

    let _: Option<Molecule> = cache
        .resolve_one(1i64, &ResolveOptions::new(), &molecules)
        .await
        .expect("molecule");
    let keyword: Option<KeywordSet> = cache
        .resolve_one(1i64, &ResolveOptions::new(), &keywords)
        .await
        .expect("keyword");

    assert!(keyword.is_some());
    assert_eq!(keywords.calls(), 1);
    assert!(cache
        .backend()
        .memory()
        .contains(EntityKind::KeywordSet, &EntityIdentity::from(1i64)));

    let removed = cache
        .invalidate_kind(EntityKind::Molecule)
        .await
        .expect("invalidate");
    assert_eq!(removed, 1);
    assert!(cache
        .backend()
        .memory()
        .contains(EntityKind::KeywordSet, &EntityIdentity::from(1i64)));
}

// ============================================================================
// LIMITS AND ERRORS
// ============================================================================

#[tokio::test]
async fn test_limit_applies_to_uncached_ids_only() {
    let mut cache = PortalCache::in_memory().expect("open");
    cache.set_limits(ServerLimits::unlimited().with_limit(EntityKind::Molecule, 2));
    let remote = molecule_remote(1..=4);

    let err = cache
        .resolve_many::<Molecule, _>(&identities(1i64..=3), &ResolveOptions::new(), &remote)
        .await
        .expect_err("over limit");
    assert_eq!(
        err,
        PortalError::Resolve(ResolveError::LimitExceeded {
            kind: EntityKind::Molecule,
            requested: 3,
            limit: 2,
        })
    );
    assert_eq!(remote.calls(), 0);

    for batch in [[1i64, 2], [3, 4]] {
        let _: Vec<Option<Molecule>> = cache
            .resolve_many(&identities(batch), &ResolveOptions::new(), &remote)
            .await
            .expect("within limit");
    }

    let all: Vec<Option<Molecule>> = cache
        .resolve_many(&identities(1i64..=4), &ResolveOptions::new(), &remote)
        .await
        .expect("fully cached");
    assert_eq!(all.len(), 4);
    assert_eq!(remote.calls(), 2);
}

#[tokio::test]
async fn test_fetch_error_is_returned_unchanged() {
    let dir = TempDir::new().expect("tempdir");
    let cache = PortalCache::open(&disk_config(&dir)).expect("open");
    let remote = molecule_remote([1, 2]);
    let failure: PortalError = FetchError::Unauthorized {
        reason: "token expired".to_string(),
    }
    .into();
    remote.fail_with(failure.clone());

    let err = cache
        .resolve_many::<Molecule, _>(&identities([1i64, 2]), &ResolveOptions::new(), &remote)
        .await
        .expect_err("fetch fails");
    assert_eq!(err, failure);
    assert_eq!(cache.stats().await.expect("stats").entry_count, 0);

    remote.recover();
    let slots: Vec<Option<Molecule>> = cache
        .resolve_many(&identities([1i64, 2]), &ResolveOptions::new(), &remote)
        .await
        .expect("after recovery");
    assert_eq!(slots.len(), 2);
    assert_eq!(remote.calls(), 2);
}

#[tokio::test]
async fn test_not_found_names_missing_ids() {
    let cache = PortalCache::in_memory().expect("open");
    let remote = molecule_remote([1, 3]);

    let err = cache
        .resolve_many::<Molecule, _>(&identities([1i64, 2, 3]), &ResolveOptions::new(), &remote)
        .await
        .expect_err("id 2 is unknown");

    assert_eq!(err.missing_identities(), Some(&identities([2i64])[..]));
    assert!(err.to_string().contains('2'));

    let slots: Vec<Option<Molecule>> = cache
        .resolve_many(
            &identities([1i64, 2, 3]),
            &ResolveOptions::new().missing_ok(true),
            &remote,
        )
        .await
        .expect("missing ok");
    assert_eq!(slots, vec![Some(molecule(1)), None, Some(molecule(3))]);
}

#[tokio::test]
async fn test_repeat_resolution_fetches_once() {
    let cache = PortalCache::in_memory().expect("open");
    let remote = molecule_remote([1, 2]);
    let ids = identities([1i64, 2]);

    for _ in 0..2 {
        let _: Vec<Option<Molecule>> = cache
            .resolve_many(&ids, &ResolveOptions::new(), &remote)
            .await
            .expect("resolve");
    }

    assert_eq!(remote.calls(), 1);
    let stats = cache.stats().await.expect("stats");
    assert_eq!(stats.hits, 2);
}
