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

//! The query-result cache container: lookup, population, invalidation,
//! and size-bounded eviction.

use crate::cache::{
    CacheConfig, CacheKey, CacheResult, CacheStats, CacheStatsSnapshot, CachedResult,
    InvalidationMode,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use taiga_core::ecs::{ComponentTypeId, EntityId};
use taiga_core::memory::EntityBufferPool;

/// Memoizes the entity sets produced by archetype traversal, keyed by
/// the structural identity of the query shape.
///
/// Lookups dominate and run under the shared side of the entry lock;
/// only structural mutation (insert, remove, evict) serializes on the
/// write side. Buffers are never handed out while a disposer is waiting
/// on them, and never disposed while a reader is in flight; the
/// reader/disposer discipline lives in [`CachedResult`].
///
/// All mutable bookkeeping (the version clock, the per-type modification
/// versions, the statistics) is owned by the instance. Independent
/// caches (one per world, one per test) never share state.
pub struct QueryResultCache {
    /// CacheKey → result. Concurrent reads; serialized structural
    /// mutation.
    entries: RwLock<HashMap<CacheKey, Arc<CachedResult>>>,
    /// Monotonically increasing version clock. Every invalidation
    /// operation advances it; results record the clock at creation.
    global_version: AtomicU64,
    /// Results produced before this floor are stale in every mode.
    /// Advanced by global invalidation and frame boundaries.
    invalidation_floor: AtomicU64,
    /// Last-modified version per component type (`ComponentBased`
    /// mode). Bounded by the number of registered component types;
    /// this replaces an ever-growing modified-type set.
    type_versions: RwLock<HashMap<ComponentTypeId, u64>>,
    /// Logical clock for LRU access stamps. Strictly monotonic, so
    /// eviction ordering is deterministic even within one instant.
    access_clock: AtomicU64,
    config: CacheConfig,
    stats: CacheStats,
    pool: Arc<dyn EntityBufferPool>,
}

impl QueryResultCache {
    /// Builds a cache over the given buffer pool, failing fast on an
    /// invalid configuration.
    pub fn new(config: CacheConfig, pool: Arc<dyn EntityBufferPool>) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self {
            entries: RwLock::new(HashMap::new()),
            global_version: AtomicU64::new(1),
            invalidation_floor: AtomicU64::new(1),
            type_versions: RwLock::new(HashMap::new()),
            access_clock: AtomicU64::new(0),
            config,
            stats: CacheStats::default(),
            pool,
        })
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The pool buffers are rented from and returned to.
    pub fn pool(&self) -> Arc<dyn EntityBufferPool> {
        Arc::clone(&self.pool)
    }

    /// The current value of the version clock.
    pub fn current_version(&self) -> u64 {
        self.global_version.load(Ordering::Acquire)
    }

    /// Number of resident cached queries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A point-in-time copy of the statistics counters.
    pub fn statistics(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Looks up `key`, validating the entry against the current
    /// invalidation checkpoint.
    ///
    /// A stale entry is removed, disposed, and reported as a miss; the
    /// removal re-checks identity under the write lock so that two
    /// threads detecting staleness at once cannot dispose the same
    /// entry twice. Safe for unlimited concurrent callers.
    pub fn try_get(&self, key: &CacheKey) -> Option<Arc<CachedResult>> {
        if !self.config.enabled {
            return None;
        }

        let found = self.entries.read().unwrap().get(key).cloned();
        let Some(result) = found else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if self.is_result_valid(&result) {
            result.touch(self.next_tick());
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(result);
        }

        if self.remove_if_same(key, &result) {
            log::debug!("query cache: dropped stale entry (arity {})", key.arity());
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Takes ownership of `buffer` (holding `count` valid entries) and
    /// caches it under `key` at the current version.
    ///
    /// Results below the configured minimum size go straight back to
    /// the pool and create no entry. When two threads race to populate
    /// the same key the last insertion wins and the displaced result is
    /// disposed: exactly one buffer stays resident per key, and no
    /// buffer is ever leaked.
    pub fn store(
        &self,
        key: CacheKey,
        buffer: Vec<EntityId>,
        count: usize,
        dependent_types: Vec<ComponentTypeId>,
    ) {
        if !self.config.enabled || count < self.config.min_entities_to_cache {
            self.pool.recycle(buffer);
            return;
        }

        let result = Arc::new(CachedResult::new(
            buffer,
            count,
            self.current_version(),
            dependent_types,
            self.next_tick(),
        ));
        self.stats.add_resident(result.estimated_bytes());

        let displaced = self.entries.write().unwrap().insert(key, result);
        if let Some(previous) = displaced {
            // Lost populate race, or a stale entry replaced in place.
            self.stats.remove_resident(previous.estimated_bytes());
            previous.dispose_into(self.pool.as_ref());
            log::debug!("query cache: replaced an existing entry for the same key");
        }

        self.evict_over_capacity();
    }

    /// Makes every currently cached result stale.
    ///
    /// A single atomic bump of the version clock; entries are removed
    /// lazily on their next lookup rather than eagerly swept, trading a
    /// little retained-but-dead memory for a constant-time hot path.
    pub fn invalidate_all(&self) {
        let next = self.global_version.fetch_add(1, Ordering::AcqRel) + 1;
        self.invalidation_floor.fetch_max(next, Ordering::AcqRel);
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        log::debug!("query cache: global invalidation, version now {next}");
    }

    /// Marks `type_id` as modified.
    ///
    /// Under `ComponentBased` mode only results depending on that type
    /// go stale; unrelated cached queries survive. Under `Global` mode
    /// any modification invalidates everything. Under `PerFrame` mode
    /// the frame boundary is the only checkpoint and this is a no-op.
    pub fn invalidate_component_type(&self, type_id: ComponentTypeId) {
        match self.config.mode {
            InvalidationMode::Global => self.invalidate_all(),
            InvalidationMode::PerFrame => {}
            InvalidationMode::ComponentBased => {
                let version = self.global_version.fetch_add(1, Ordering::AcqRel) + 1;
                let mut type_versions = self.type_versions.write().unwrap();
                let slot = type_versions.entry(type_id).or_insert(0);
                *slot = (*slot).max(version);
                self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
                log::debug!("query cache: component type {type_id:?} modified at version {version}");
            }
        }
    }

    /// Frame-boundary checkpoint.
    ///
    /// Under `PerFrame` mode the entire cache goes stale: the first
    /// touch of each key in the new frame misses and repopulates, and
    /// every later touch within the frame hits. A no-op in the other
    /// modes, so the frame loop can drive it unconditionally.
    pub fn begin_frame(&self) {
        if self.config.mode != InvalidationMode::PerFrame {
            return;
        }
        let next = self.global_version.fetch_add(1, Ordering::AcqRel) + 1;
        self.invalidation_floor.fetch_max(next, Ordering::AcqRel);
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        log::debug!("query cache: frame boundary, version now {next}");
    }

    /// Disposes every retained result, returning all buffers to the
    /// pool.
    pub fn clear(&self) {
        let drained: Vec<(CacheKey, Arc<CachedResult>)> = {
            let mut entries = self.entries.write().unwrap();
            entries.drain().collect()
        };
        for (_, result) in drained {
            self.stats.remove_resident(result.estimated_bytes());
            result.dispose_into(self.pool.as_ref());
        }
    }

    /// Advances the logical access clock.
    fn next_tick(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Validity of a result under the configured invalidation policy.
    fn is_result_valid(&self, result: &CachedResult) -> bool {
        let floor = self.invalidation_floor.load(Ordering::Acquire);
        if !result.is_valid(floor) {
            return false;
        }
        match self.config.mode {
            InvalidationMode::Global | InvalidationMode::PerFrame => true,
            InvalidationMode::ComponentBased => {
                let type_versions = self.type_versions.read().unwrap();
                !result.dependent_types().iter().any(|type_id| {
                    type_versions
                        .get(type_id)
                        .is_some_and(|&modified| modified > result.version())
                })
            }
        }
    }

    /// Removes `key` only if it still maps to this exact result
    /// instance, then disposes it. Returns whether a removal happened.
    ///
    /// The identity re-check under the write lock is what makes
    /// concurrent stale-detection and eviction race-free: a fresh
    /// result stored under the same key in the meantime is left alone.
    fn remove_if_same(&self, key: &CacheKey, result: &Arc<CachedResult>) -> bool {
        let removed = {
            let mut entries = self.entries.write().unwrap();
            match entries.get(key) {
                Some(current) if Arc::ptr_eq(current, result) => entries.remove(key),
                _ => None,
            }
        };
        match removed {
            Some(stale) => {
                self.stats.remove_resident(stale.estimated_bytes());
                stale.dispose_into(self.pool.as_ref());
                true
            }
            None => false,
        }
    }

    /// LRU eviction down to the configured bound.
    ///
    /// Candidates are snapshotted under the read lock and sorted by
    /// last access outside any lock; each removal then re-checks
    /// identity, so eviction only contends with readers of the specific
    /// entries being evicted.
    fn evict_over_capacity(&self) {
        let max = self.config.max_cached_queries;
        let mut candidates: Vec<(CacheKey, u64, Arc<CachedResult>)> = {
            let entries = self.entries.read().unwrap();
            if entries.len() <= max {
                return;
            }
            entries
                .iter()
                .map(|(key, result)| (key.clone(), result.last_access(), Arc::clone(result)))
                .collect()
        };

        candidates.sort_by_key(|&(_, last_access, _)| last_access);
        let excess = candidates.len() - max + 1;

        for (key, _, result) in candidates.into_iter().take(excess) {
            if self.remove_if_same(&key, &result) {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "query cache: evicted least-recently-used entry ({} entities)",
                    result.count()
                );
            }
        }
    }
}

impl Drop for QueryResultCache {
    fn drop(&mut self) {
        self.clear();
    }
}
