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

//! The integration shim between query execution and the result cache.

use crate::cache::{CacheKey, CacheResult, QueryResultCache, QueryShape};
use std::sync::Arc;
use taiga_core::ecs::{ArchetypeTraversal, EntityId};
use taiga_core::memory::EntityBufferPool;

/// Initial capacity requested from the pool on the miss path. The
/// rented vector grows past it if the traversal matches more entities.
const INITIAL_RENT_CAPACITY: usize = 256;

/// The external work-distribution boundary: splits an entity list
/// across workers and invokes the per-entity action.
///
/// The cache layer decides *what* to dispatch over (a cached view or a
/// freshly filled buffer), never *how*; scheduling belongs to the
/// implementation behind this trait.
pub trait EntityDispatcher: Send + Sync {
    /// Invokes `action` for every entity in `entities`. The slice stays
    /// read-locked by the caller for the whole dispatch.
    fn dispatch(&self, entities: &[EntityId], action: &(dyn Fn(EntityId) + Sync));
}

/// Runs the per-entity action inline on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialDispatcher;

impl EntityDispatcher for SequentialDispatcher {
    fn dispatch(&self, entities: &[EntityId], action: &(dyn Fn(EntityId) + Sync)) {
        for &entity in entities {
            action(entity);
        }
    }
}

/// Fans the per-entity action out across the rayon worker pool.
#[cfg(feature = "parallel")]
#[derive(Debug, Default, Clone, Copy)]
pub struct RayonDispatcher;

#[cfg(feature = "parallel")]
impl EntityDispatcher for RayonDispatcher {
    fn dispatch(&self, entities: &[EntityId], action: &(dyn Fn(EntityId) + Sync)) {
        use rayon::prelude::*;
        entities.par_iter().for_each(|&entity| action(entity));
    }
}

/// What one execution did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Number of entities the action was invoked over.
    pub matched: usize,
    /// True when the entity set came from the cache rather than a
    /// fresh traversal.
    pub served_from_cache: bool,
}

/// Executes component-shape queries through the optional result cache.
///
/// On a hit the per-entity action dispatches over the read-locked
/// cached view. On a miss the world is traversed into a rented buffer,
/// the action dispatches over the filled prefix, and only then is the
/// buffer handed to the cache. Dispatch strictly precedes the store,
/// so a buffer is never touched after ownership transfer. With the
/// cache disabled (or bypassed per call) execution is functionally
/// identical to not having a cache at all.
pub struct CachedQueryExecutor<T, D> {
    cache: Arc<QueryResultCache>,
    traversal: T,
    dispatcher: D,
    pool: Arc<dyn EntityBufferPool>,
}

impl<T: ArchetypeTraversal, D: EntityDispatcher> CachedQueryExecutor<T, D> {
    /// Builds an executor over the given collaborators. Buffers are
    /// rented from the same pool the cache returns them to.
    pub fn new(cache: Arc<QueryResultCache>, traversal: T, dispatcher: D) -> Self {
        let pool = cache.pool();
        Self {
            cache,
            traversal,
            dispatcher,
            pool,
        }
    }

    /// The cache this executor consults.
    pub fn cache(&self) -> &Arc<QueryResultCache> {
        &self.cache
    }

    /// Executes `shape` over the world, optionally through the cache.
    ///
    /// `arity` is the number of component type parameters the calling
    /// query binds; it is part of the cache key. Errors surface only
    /// from the collaborators (pool exhaustion, traversal failure);
    /// cache-internal races degrade to a repopulate, never to an error.
    pub fn execute(
        &self,
        shape: &QueryShape,
        arity: u8,
        action: &(dyn Fn(EntityId) + Sync),
        use_cache: bool,
    ) -> CacheResult<ExecutionOutcome> {
        if !use_cache || !self.cache.config().enabled {
            return self.execute_uncached(shape, action);
        }

        let key = CacheKey::from_shape(shape, arity);
        if let Some(result) = self.cache.try_get(&key) {
            let read = result.read(|entities| {
                self.dispatcher.dispatch(entities, action);
                entities.len()
            });
            match read {
                Ok(matched) => {
                    return Ok(ExecutionOutcome {
                        matched,
                        served_from_cache: true,
                    });
                }
                Err(_) => {
                    // Disposed between lookup and read (concurrent
                    // invalidation); fall through and repopulate.
                    log::debug!("query cache: hit disposed under us, repopulating");
                }
            }
        }

        // Miss path: traverse into a rented buffer, dispatch, store.
        let mut buffer = self.pool.rent(INITIAL_RENT_CAPACITY)?;
        let count = match self.traversal.collect_matching(
            shape.all_of(),
            shape.none_of(),
            shape.any_of(),
            &mut buffer,
        ) {
            Ok(count) => count,
            Err(err) => {
                // No partial result is ever stored; the buffer goes
                // back exactly as it would on success.
                self.pool.recycle(buffer);
                return Err(err.into());
            }
        };

        self.dispatcher.dispatch(&buffer[..count], action);
        self.cache.store(key, buffer, count, shape.dependent_types());

        Ok(ExecutionOutcome {
            matched: count,
            served_from_cache: false,
        })
    }

    /// The fallback path: a fresh traversal with no cache interaction.
    fn execute_uncached(
        &self,
        shape: &QueryShape,
        action: &(dyn Fn(EntityId) + Sync),
    ) -> CacheResult<ExecutionOutcome> {
        let mut buffer = self.pool.rent(INITIAL_RENT_CAPACITY)?;
        let count = match self.traversal.collect_matching(
            shape.all_of(),
            shape.none_of(),
            shape.any_of(),
            &mut buffer,
        ) {
            Ok(count) => count,
            Err(err) => {
                self.pool.recycle(buffer);
                return Err(err.into());
            }
        };

        self.dispatcher.dispatch(&buffer[..count], action);
        self.pool.recycle(buffer);

        Ok(ExecutionOutcome {
            matched: count,
            served_from_cache: false,
        })
    }
}
