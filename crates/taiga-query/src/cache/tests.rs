// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taiga_core::ecs::{ArchetypeTraversal, ComponentTypeId, EntityId, TraversalError};
use taiga_core::memory::{BucketedEntityPool, EntityBufferPool};

// --- TEST HELPERS ---

const POSITION: ComponentTypeId = ComponentTypeId(0);
const VELOCITY: ComponentTypeId = ComponentTypeId(1);
const RENDER_TAG: ComponentTypeId = ComponentTypeId(2);

fn entity(index: u32) -> EntityId {
    EntityId::new(index, 0)
}

fn entities(count: u32) -> Vec<EntityId> {
    (0..count).map(entity).collect()
}

fn test_cache(config: CacheConfig) -> (Arc<QueryResultCache>, Arc<BucketedEntityPool>) {
    let pool = Arc::new(BucketedEntityPool::new());
    let cache = QueryResultCache::new(config, pool.clone()).expect("config should validate");
    (Arc::new(cache), pool)
}

/// Rents a buffer from `pool` and fills it with `count` entities.
fn filled_buffer(pool: &BucketedEntityPool, count: u32) -> Vec<EntityId> {
    let mut buffer = pool.rent(count as usize).expect("unlimited pool must rent");
    buffer.extend(entities(count));
    buffer
}

fn shape_all(ids: &[ComponentTypeId]) -> QueryShape {
    ids.iter()
        .fold(QueryShape::new(), |shape, &id| shape.with_all(id))
}

/// A world that always matches the same fixed entity set, counting how
/// often it is scanned.
struct FixedWorld {
    entities: Vec<EntityId>,
    scans: Arc<AtomicUsize>,
}

impl ArchetypeTraversal for FixedWorld {
    fn collect_matching(
        &self,
        _all_of: &[ComponentTypeId],
        _none_of: &[ComponentTypeId],
        _any_of: &[ComponentTypeId],
        out: &mut Vec<EntityId>,
    ) -> Result<usize, TraversalError> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        out.extend_from_slice(&self.entities);
        Ok(self.entities.len())
    }
}

/// A world whose storage is permanently broken.
struct FailingWorld;

impl ArchetypeTraversal for FailingWorld {
    fn collect_matching(
        &self,
        _all_of: &[ComponentTypeId],
        _none_of: &[ComponentTypeId],
        _any_of: &[ComponentTypeId],
        _out: &mut Vec<EntityId>,
    ) -> Result<usize, TraversalError> {
        Err(TraversalError::StorageUnavailable("broken".into()))
    }
}

// --- CACHE KEY ---

#[test]
fn key_ignores_declaration_order() {
    let forward = shape_all(&[POSITION, VELOCITY]).with_none(RENDER_TAG);
    let reversed = shape_all(&[VELOCITY, POSITION]).with_none(RENDER_TAG);

    let a = CacheKey::from_shape(&forward, 2);
    let b = CacheKey::from_shape(&reversed, 2);

    assert_eq!(a, b, "declaration order must not affect key identity");
    assert_eq!(
        a.type_hashes(),
        b.type_hashes(),
        "canonical sequences must be identical"
    );

    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let hash_of = |key: &CacheKey| {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    };
    assert_eq!(hash_of(&a), hash_of(&b), "equal keys must hash equal");
}

#[test]
fn key_distinguishes_filter_kind() {
    // Same component types, different filter semantics.
    let required = shape_all(&[POSITION, VELOCITY]);
    let excluded = QueryShape::new().with_all(POSITION).with_none(VELOCITY);
    let either = QueryShape::new().with_any(POSITION).with_any(VELOCITY);

    let a = CacheKey::from_shape(&required, 2);
    let b = CacheKey::from_shape(&excluded, 2);
    let c = CacheKey::from_shape(&either, 2);

    assert_ne!(a, b, "all-of vs none-of must key differently");
    assert_ne!(a, c, "all-of vs any-of must key differently");
    assert_ne!(b, c);
    assert!(a.filter_flags().contains(QueryFilterFlags::ALL_OF));
    assert!(b.filter_flags().contains(QueryFilterFlags::NONE_OF));
    assert!(c.filter_flags().contains(QueryFilterFlags::ANY_OF));
}

#[test]
fn key_distinguishes_arity() {
    let shape = shape_all(&[POSITION, VELOCITY]);

    let two = CacheKey::from_shape(&shape, 2);
    let three = CacheKey::from_shape(&shape, 3);

    assert_ne!(two, three, "arity is part of the key's identity");
}

// --- HIT / MISS BASICS ---

#[test]
fn hit_returns_exact_entity_set() {
    // --- 1. SETUP ---
    let (cache, pool) = test_cache(CacheConfig::default());
    let key = CacheKey::from_shape(&shape_all(&[POSITION]), 1);
    let buffer = filled_buffer(&pool, 50);

    // --- 2. ACTION ---
    cache.store(key.clone(), buffer, 50, vec![POSITION]);
    let result = cache.try_get(&key).expect("freshly stored entry must hit");

    // --- 3. ASSERTIONS ---
    let mut copied = Vec::new();
    let count = result.copy_into(&mut copied).expect("result is live");
    assert_eq!(count, 50);
    assert_eq!(
        copied,
        entities(50),
        "the hit must return the same identities in the same order"
    );

    let stats = cache.statistics();
    assert_eq!(stats.hit_count, 1);
    assert_eq!(stats.miss_count, 0);
    assert_eq!(stats.cached_query_count, 1);
    assert_eq!(
        stats.estimated_bytes,
        50 * std::mem::size_of::<EntityId>() as u64
    );
}

#[test]
fn lookup_of_unknown_key_is_a_miss() {
    let (cache, _pool) = test_cache(CacheConfig::default());
    let key = CacheKey::from_shape(&shape_all(&[POSITION]), 1);

    assert!(cache.try_get(&key).is_none());
    assert_eq!(cache.statistics().miss_count, 1);
}

#[test]
fn small_results_bypass_the_cache() {
    // min_entities_to_cache = 10, per the documented scenario.
    let config = CacheConfig {
        min_entities_to_cache: 10,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let key = CacheKey::from_shape(&shape_all(&[POSITION]), 1);

    // A 5-entity result is not worth caching: the buffer must go
    // straight back to the pool and no entry may be created.
    let small = filled_buffer(&pool, 5);
    cache.store(key.clone(), small, 5, vec![POSITION]);
    assert!(cache.try_get(&key).is_none(), "5 < 10 must not be cached");
    assert_eq!(cache.len(), 0);
    assert_eq!(pool.outstanding(), 0, "the bypassed buffer was recycled");

    // A 50-entity result is cached and hits with its full count.
    let large = filled_buffer(&pool, 50);
    cache.store(key.clone(), large, 50, vec![POSITION]);
    let result = cache.try_get(&key).expect("50 >= 10 must be cached");
    assert_eq!(result.count(), 50);
}

// --- INVALIDATION ---

#[test]
fn global_invalidation_makes_every_key_miss() {
    // --- 1. SETUP ---
    let config = CacheConfig {
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let key_a = CacheKey::from_shape(&shape_all(&[POSITION]), 1);
    let key_b = CacheKey::from_shape(&shape_all(&[VELOCITY]), 1);
    cache.store(key_a.clone(), filled_buffer(&pool, 20), 20, vec![POSITION]);
    cache.store(key_b.clone(), filled_buffer(&pool, 30), 30, vec![VELOCITY]);

    // --- 2. ACTION ---
    cache.invalidate_all();

    // --- 3. ASSERTIONS ---
    assert!(cache.try_get(&key_a).is_none(), "stale entry must miss");
    assert!(cache.try_get(&key_b).is_none(), "stale entry must miss");
    assert_eq!(
        cache.len(),
        0,
        "stale entries are removed lazily on lookup"
    );
    assert_eq!(
        pool.outstanding(),
        0,
        "every invalidated buffer went back to the pool"
    );
    assert_eq!(cache.statistics().invalidation_count, 1);
}

#[test]
fn component_scoped_invalidation_is_selective() {
    // --- 1. SETUP ---
    let config = CacheConfig {
        mode: InvalidationMode::ComponentBased,
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let key_a = CacheKey::from_shape(&shape_all(&[POSITION]), 1);
    let key_b = CacheKey::from_shape(&shape_all(&[VELOCITY]), 1);
    cache.store(key_a.clone(), filled_buffer(&pool, 20), 20, vec![POSITION]);
    cache.store(key_b.clone(), filled_buffer(&pool, 20), 20, vec![VELOCITY]);

    // --- 2. ACTION ---
    cache.invalidate_component_type(POSITION);

    // --- 3. ASSERTIONS ---
    assert!(
        cache.try_get(&key_a).is_none(),
        "the result depending on the modified type must miss"
    );
    assert!(
        cache.try_get(&key_b).is_some(),
        "an unrelated cached query must survive"
    );
}

#[test]
fn component_scoped_invalidation_covers_negative_clauses() {
    // An entity gaining or losing an excluded component changes the
    // result set too, so none-of types are dependencies as well.
    let config = CacheConfig {
        mode: InvalidationMode::ComponentBased,
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);

    let shape = QueryShape::new().with_all(POSITION).with_none(RENDER_TAG);
    let key = CacheKey::from_shape(&shape, 1);
    cache.store(
        key.clone(),
        filled_buffer(&pool, 20),
        20,
        shape.dependent_types(),
    );

    cache.invalidate_component_type(RENDER_TAG);

    assert!(
        cache.try_get(&key).is_none(),
        "modifying an excluded type must invalidate the result"
    );
}

#[test]
fn per_frame_mode_resets_at_the_boundary() {
    // --- 1. SETUP ---
    let config = CacheConfig {
        mode: InvalidationMode::PerFrame,
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let key = CacheKey::from_shape(&shape_all(&[POSITION]), 1);

    // --- 2. ACTION & ASSERTIONS ---
    cache.begin_frame();

    // First touch of the frame misses; population follows.
    assert!(cache.try_get(&key).is_none());
    cache.store(key.clone(), filled_buffer(&pool, 20), 20, vec![POSITION]);

    // Every later touch within the same frame hits.
    assert!(cache.try_get(&key).is_some());
    assert!(cache.try_get(&key).is_some());

    // The next frame boundary makes the same key miss again.
    cache.begin_frame();
    assert!(cache.try_get(&key).is_none(), "new frame, stale result");
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn begin_frame_outside_per_frame_mode_is_a_no_op() {
    let config = CacheConfig {
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let key = CacheKey::from_shape(&shape_all(&[POSITION]), 1);
    cache.store(key.clone(), filled_buffer(&pool, 20), 20, vec![POSITION]);

    cache.begin_frame();

    assert!(
        cache.try_get(&key).is_some(),
        "frame boundaries must not invalidate a Global-mode cache"
    );
}

// --- EVICTION ---

#[test]
fn eviction_removes_the_least_recently_used_entries() {
    // --- 1. SETUP ---
    let config = CacheConfig {
        max_cached_queries: 3,
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let keys: Vec<CacheKey> = (0..4)
        .map(|raw| CacheKey::from_shape(&shape_all(&[ComponentTypeId(raw)]), 1))
        .collect();

    cache.store(keys[0].clone(), filled_buffer(&pool, 10), 10, vec![]);
    cache.store(keys[1].clone(), filled_buffer(&pool, 10), 10, vec![]);
    cache.store(keys[2].clone(), filled_buffer(&pool, 10), 10, vec![]);

    // Refresh entries 0 and 2; entry 1 stays untouched and oldest.
    assert!(cache.try_get(&keys[0]).is_some());
    assert!(cache.try_get(&keys[2]).is_some());

    // --- 2. ACTION ---
    // The fourth store pushes the cache over capacity.
    cache.store(keys[3].clone(), filled_buffer(&pool, 10), 10, vec![]);

    // --- 3. ASSERTIONS ---
    assert!(
        cache.try_get(&keys[1]).is_none(),
        "the untouched oldest entry must have been evicted"
    );
    assert!(
        cache.try_get(&keys[3]).is_some(),
        "the newest entry must survive eviction"
    );
    assert!(cache.len() <= 3);
    assert!(cache.statistics().eviction_count >= 1);
    assert_eq!(
        pool.outstanding(),
        cache.len() as u64,
        "every evicted buffer went back to the pool"
    );
}

#[test]
fn entry_count_never_exceeds_the_configured_bound() {
    let config = CacheConfig {
        max_cached_queries: 4,
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);

    for raw in 0..10u32 {
        let key = CacheKey::from_shape(&shape_all(&[ComponentTypeId(raw)]), 1);
        cache.store(key, filled_buffer(&pool, 10), 10, vec![]);
        assert!(
            cache.len() <= 4,
            "the resident entry count must never exceed max_cached_queries"
        );
    }
}

// --- CONCURRENCY & OWNERSHIP ---

#[test]
fn racing_stores_keep_exactly_one_buffer_per_key() {
    // --- 1. SETUP ---
    let config = CacheConfig {
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let key = CacheKey::from_shape(&shape_all(&[POSITION]), 1);

    // --- 2. ACTION ---
    // Eight threads race to populate the same key.
    std::thread::scope(|scope| {
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let pool = Arc::clone(&pool);
            let key = key.clone();
            scope.spawn(move || {
                let buffer = filled_buffer(&pool, 32);
                cache.store(key, buffer, 32, vec![POSITION]);
            });
        }
    });

    // --- 3. ASSERTIONS ---
    assert_eq!(cache.len(), 1, "exactly one winner may stay resident");
    assert_eq!(
        pool.outstanding(),
        1,
        "all losing buffers were recycled exactly once: rented == recycled + resident"
    );
    assert!(cache.try_get(&key).is_some());
}

#[test]
fn concurrent_readers_and_invalidation_never_tear() {
    // --- 1. SETUP ---
    let config = CacheConfig {
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let key = CacheKey::from_shape(&shape_all(&[POSITION]), 1);
    cache.store(key.clone(), filled_buffer(&pool, 100), 100, vec![POSITION]);

    // --- 2. ACTION ---
    // Readers copy the cached set while another thread invalidates and
    // a third repopulates. Every read must observe either the complete
    // set or a clean miss/disposal, never a torn buffer.
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            scope.spawn(move || {
                for _ in 0..100 {
                    if let Some(result) = cache.try_get(&key) {
                        let mut copied = Vec::new();
                        if let Ok(count) = result.copy_into(&mut copied) {
                            assert_eq!(count, 100, "reads must never be partial");
                            assert_eq!(copied.len(), 100);
                        }
                    }
                }
            });
        }

        let invalidator = Arc::clone(&cache);
        scope.spawn(move || {
            for _ in 0..50 {
                invalidator.invalidate_all();
            }
        });

        let writer = Arc::clone(&cache);
        let writer_pool = Arc::clone(&pool);
        let writer_key = key.clone();
        scope.spawn(move || {
            for _ in 0..20 {
                let buffer = filled_buffer(&writer_pool, 100);
                writer.store(writer_key.clone(), buffer, 100, vec![POSITION]);
            }
        });
    });

    // --- 3. ASSERTIONS ---
    cache.clear();
    assert_eq!(
        pool.outstanding(),
        0,
        "after teardown every rented buffer is back in the pool"
    );
}

#[test]
fn reads_after_disposal_fail_cleanly() {
    let config = CacheConfig {
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let key = CacheKey::from_shape(&shape_all(&[POSITION]), 1);
    cache.store(key.clone(), filled_buffer(&pool, 20), 20, vec![POSITION]);

    let result = cache.try_get(&key).expect("entry must hit");
    cache.clear();

    let mut copied = Vec::new();
    assert!(
        matches!(result.copy_into(&mut copied), Err(CacheError::ResultDisposed)),
        "a held handle must report disposal, never expose a reclaimed buffer"
    );
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn clear_returns_every_buffer_to_the_pool() {
    let config = CacheConfig {
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    for raw in 0..5u32 {
        let key = CacheKey::from_shape(&shape_all(&[ComponentTypeId(raw)]), 1);
        cache.store(key, filled_buffer(&pool, 20), 20, vec![]);
    }
    assert_eq!(pool.outstanding(), 5);

    cache.clear();

    assert!(cache.is_empty());
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(cache.statistics().cached_query_count, 0);
}

// --- CONFIGURATION ---

#[test]
fn invalid_configuration_fails_fast() {
    let pool: Arc<BucketedEntityPool> = Arc::new(BucketedEntityPool::new());
    let config = CacheConfig {
        max_cached_queries: 0,
        ..CacheConfig::default()
    };

    let outcome = QueryResultCache::new(config, pool);

    assert!(
        matches!(outcome, Err(CacheError::InvalidConfig { .. })),
        "max_cached_queries < 1 must be rejected at construction, not clamped"
    );
}

#[test]
fn disabled_cache_stores_nothing_and_never_hits() {
    let config = CacheConfig {
        enabled: false,
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let key = CacheKey::from_shape(&shape_all(&[POSITION]), 1);

    cache.store(key.clone(), filled_buffer(&pool, 20), 20, vec![POSITION]);

    assert!(cache.try_get(&key).is_none());
    assert_eq!(cache.len(), 0);
    assert_eq!(pool.outstanding(), 0, "the buffer was recycled immediately");
}

// --- EXECUTOR SHIM ---

#[test]
fn executor_misses_then_hits_without_rescanning() {
    // --- 1. SETUP ---
    let scans = Arc::new(AtomicUsize::new(0));
    let world = FixedWorld {
        entities: entities(500),
        scans: Arc::clone(&scans),
    };
    let (cache, _pool) = test_cache(CacheConfig::default());
    let executor = CachedQueryExecutor::new(Arc::clone(&cache), world, SequentialDispatcher);
    let shape = shape_all(&[POSITION, VELOCITY]);
    let visited = AtomicUsize::new(0);
    let action = |_entity: EntityId| {
        visited.fetch_add(1, Ordering::Relaxed);
    };

    // --- 2. ACTION ---
    let first = executor
        .execute(&shape, 2, &action, true)
        .expect("traversal succeeds");
    let second = executor
        .execute(&shape, 2, &action, true)
        .expect("cached execution succeeds");

    // --- 3. ASSERTIONS ---
    assert_eq!(first.matched, 500);
    assert!(!first.served_from_cache, "the first execution must scan");
    assert_eq!(second.matched, 500);
    assert!(second.served_from_cache, "the second execution must hit");
    assert_eq!(
        scans.load(Ordering::Relaxed),
        1,
        "the world is traversed exactly once"
    );
    assert_eq!(
        visited.load(Ordering::Relaxed),
        1000,
        "the action ran over every entity on both executions"
    );
}

#[test]
fn executor_bypasses_the_cache_on_request() {
    let scans = Arc::new(AtomicUsize::new(0));
    let world = FixedWorld {
        entities: entities(100),
        scans: Arc::clone(&scans),
    };
    let (cache, pool) = test_cache(CacheConfig::default());
    let executor = CachedQueryExecutor::new(Arc::clone(&cache), world, SequentialDispatcher);
    let shape = shape_all(&[POSITION]);

    for _ in 0..3 {
        let outcome = executor
            .execute(&shape, 1, &|_| {}, false)
            .expect("uncached execution succeeds");
        assert!(!outcome.served_from_cache);
    }

    assert_eq!(scans.load(Ordering::Relaxed), 3, "every execution scans");
    assert!(cache.is_empty(), "the bypass path never populates");
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn traversal_failure_stores_nothing_and_recycles_the_buffer() {
    let (cache, pool) = test_cache(CacheConfig::default());
    let executor = CachedQueryExecutor::new(Arc::clone(&cache), FailingWorld, SequentialDispatcher);
    let shape = shape_all(&[POSITION]);

    let outcome = executor.execute(&shape, 1, &|_| {}, true);

    assert!(matches!(outcome, Err(CacheError::Traversal(_))));
    assert!(cache.is_empty(), "no partial result may be stored");
    assert_eq!(
        pool.outstanding(),
        0,
        "the rented buffer went back on the error path"
    );
}

#[test]
fn pool_exhaustion_propagates_on_the_miss_path() {
    let pool = Arc::new(BucketedEntityPool::with_rent_limit(0));
    let cache = Arc::new(
        QueryResultCache::new(CacheConfig::default(), pool).expect("config should validate"),
    );
    let world = FixedWorld {
        entities: entities(10),
        scans: Arc::new(AtomicUsize::new(0)),
    };
    let executor = CachedQueryExecutor::new(cache, world, SequentialDispatcher);

    let outcome = executor.execute(&shape_all(&[POSITION]), 1, &|_| {}, true);

    assert!(
        matches!(outcome, Err(CacheError::PoolExhausted(_))),
        "allocator failure is a hard error, never papered over"
    );
}

#[test]
fn statistics_snapshot_reports_all_counters() {
    let config = CacheConfig {
        min_entities_to_cache: 1,
        ..CacheConfig::default()
    };
    let (cache, pool) = test_cache(config);
    let key = CacheKey::from_shape(&shape_all(&[POSITION]), 1);

    cache.try_get(&key); // miss
    cache.store(key.clone(), filled_buffer(&pool, 20), 20, vec![POSITION]);
    cache.try_get(&key); // hit
    cache.invalidate_all();
    cache.try_get(&key); // miss, lazily removes the stale entry

    let stats = cache.statistics();
    assert_eq!(stats.hit_count, 1);
    assert_eq!(stats.miss_count, 2);
    assert_eq!(stats.invalidation_count, 1);
    assert_eq!(stats.cached_query_count, 0);
    assert_eq!(stats.estimated_bytes, 0);

    let json = stats.to_json();
    assert!(json.contains("\"hit_count\":1"), "snapshot serializes: {json}");
}
