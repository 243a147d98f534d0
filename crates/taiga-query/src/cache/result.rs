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

//! A single cached query result and its concurrency guard.

use crate::cache::{CacheError, CacheResult};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use taiga_core::ecs::{ComponentTypeId, EntityId};
use taiga_core::memory::EntityBufferPool;

/// Owner of one pooled entity buffer plus the metadata needed to judge
/// staleness and to guard concurrent access.
///
/// Many threads may read the buffer concurrently through the shared
/// side of the lock; disposal takes the exclusive side and therefore
/// waits out every in-flight reader before the buffer goes back to the
/// pool. From disposal onward the buffer slot is `None` and every later
/// read reports [`CacheError::ResultDisposed`]; a reader can never
/// observe a buffer that has already been reclaimed.
#[derive(Debug)]
pub struct CachedResult {
    /// The pooled buffer. `None` exactly from disposal onward.
    buffer: RwLock<Option<Vec<EntityId>>>,
    /// Number of valid leading entries; the buffer itself is usually
    /// over-sized (pool buckets are power-of-two).
    count: usize,
    /// The cache version at which this result was produced.
    version: u64,
    /// Component types whose mutation invalidates this result, sorted
    /// and deduplicated.
    dependent_types: Vec<ComponentTypeId>,
    /// Logical tick of the last access, used for LRU ordering.
    last_access: AtomicU64,
}

impl CachedResult {
    /// Takes ownership of `buffer`, of which the first `count` entries
    /// are valid. The caller must not touch the buffer again except
    /// through this object.
    pub(crate) fn new(
        buffer: Vec<EntityId>,
        count: usize,
        version: u64,
        mut dependent_types: Vec<ComponentTypeId>,
        tick: u64,
    ) -> Self {
        debug_assert!(count <= buffer.len());
        dependent_types.sort_unstable();
        dependent_types.dedup();
        Self {
            buffer: RwLock::new(Some(buffer)),
            count,
            version,
            dependent_types,
            last_access: AtomicU64::new(tick),
        }
    }

    /// Runs `f` over the valid entries under the shared read guard.
    ///
    /// The guard is held for the whole of `f`, so a parallel dispatch
    /// over the slice is safe against concurrent disposal for its full
    /// duration.
    pub fn read<R>(&self, f: impl FnOnce(&[EntityId]) -> R) -> CacheResult<R> {
        let guard = self.buffer.read().unwrap();
        match guard.as_ref() {
            Some(buffer) => Ok(f(&buffer[..self.count])),
            None => Err(CacheError::ResultDisposed),
        }
    }

    /// Copies the valid entries into `dst` (cleared first), returning
    /// how many were copied.
    pub fn copy_into(&self, dst: &mut Vec<EntityId>) -> CacheResult<usize> {
        self.read(|entities| {
            dst.clear();
            dst.extend_from_slice(entities);
            entities.len()
        })
    }

    /// Number of valid entries.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The cache version at which this result was produced.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Component types whose mutation invalidates this result.
    pub fn dependent_types(&self) -> &[ComponentTypeId] {
        &self.dependent_types
    }

    /// Lock-free staleness fast path: valid while produced at or after
    /// `checkpoint`.
    pub fn is_valid(&self, checkpoint: u64) -> bool {
        self.version >= checkpoint
    }

    /// Logical tick of the last recorded access.
    pub(crate) fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    /// Records an access at the given logical tick.
    pub(crate) fn touch(&self, tick: u64) {
        self.last_access.fetch_max(tick, Ordering::Relaxed);
    }

    /// Estimated bytes retained while this result stays resident.
    pub(crate) fn estimated_bytes(&self) -> u64 {
        (self.count * mem::size_of::<EntityId>()) as u64
    }

    /// Returns the buffer to `pool`, waiting out in-flight readers.
    ///
    /// Idempotent: a second call finds the slot empty and is a no-op.
    pub(crate) fn dispose_into(&self, pool: &dyn EntityBufferPool) {
        let mut guard = self.buffer.write().unwrap();
        if let Some(buffer) = guard.take() {
            pool.recycle(buffer);
        }
    }
}

impl Drop for CachedResult {
    fn drop(&mut self) {
        // The cache always disposes explicitly; this only fires for a
        // result kept alive past cache teardown, in which case the
        // buffer is released to the allocator instead of the pool.
        if let Ok(slot) = self.buffer.get_mut() {
            if slot.take().is_some() {
                log::debug!(
                    "cached result dropped without disposal; releasing its buffer ({} entries)",
                    self.count
                );
            }
        }
    }
}
