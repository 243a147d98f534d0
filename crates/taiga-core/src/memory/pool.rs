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

//! Pooled entity-array buffers.
//!
//! The query layer never allocates raw entity storage itself: buffers
//! are rented from an [`EntityBufferPool`] and returned to it, and
//! exactly one owner holds a rented buffer at any time. The pool also
//! keeps lifetime counters so callers (and tests) can account for every
//! buffer: `rented == recycled + outstanding` must hold at all times.

use crate::ecs::EntityId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// The smallest bucket a rent request is rounded up to.
const MIN_BUCKET_CAPACITY: usize = 16;

/// An error reported by a pool that cannot supply a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool's configured limit on outstanding buffers is exhausted.
    Exhausted {
        /// The capacity the caller asked for.
        requested: usize,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Exhausted { requested } => {
                write!(f, "Entity buffer pool exhausted (requested capacity {requested})")
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// The allocator boundary for entity-array buffers.
pub trait EntityBufferPool: Send + Sync {
    /// Rents an empty buffer with capacity at least `capacity`.
    ///
    /// The returned capacity may exceed the request: buckets are
    /// power-of-two sized. Allocator failure is a hard error for the
    /// caller; the pool never papers over it.
    fn rent(&self, capacity: usize) -> Result<Vec<EntityId>, PoolError>;

    /// Returns a previously rented buffer to the pool.
    fn recycle(&self, buffer: Vec<EntityId>);
}

/// The default in-memory pool: per-bucket free lists keyed by
/// power-of-two capacity.
///
/// An optional limit on outstanding buffers makes exhaustion testable;
/// an unlimited pool falls back to the system allocator on a free-list
/// miss and never fails.
#[derive(Debug, Default)]
pub struct BucketedEntityPool {
    /// Free lists, keyed by the power-of-two bucket capacity.
    buckets: Mutex<HashMap<usize, Vec<Vec<EntityId>>>>,
    /// Maximum number of buffers allowed out of the pool at once.
    rent_limit: Option<u64>,
    /// Lifetime count of successful rents.
    rented: AtomicU64,
    /// Lifetime count of recycles.
    recycled: AtomicU64,
}

impl BucketedEntityPool {
    /// Creates an unlimited pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool that refuses to rent once `limit` buffers are
    /// outstanding.
    pub fn with_rent_limit(limit: u64) -> Self {
        Self {
            rent_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Lifetime count of successful rents.
    pub fn rented_total(&self) -> u64 {
        self.rented.load(Ordering::Relaxed)
    }

    /// Lifetime count of recycles.
    pub fn recycled_total(&self) -> u64 {
        self.recycled.load(Ordering::Relaxed)
    }

    /// Number of buffers currently out of the pool.
    pub fn outstanding(&self) -> u64 {
        self.rented_total() - self.recycled_total()
    }

    /// Rounds a requested capacity up to its bucket.
    fn bucket_for(capacity: usize) -> usize {
        capacity.max(MIN_BUCKET_CAPACITY).next_power_of_two()
    }
}

impl EntityBufferPool for BucketedEntityPool {
    fn rent(&self, capacity: usize) -> Result<Vec<EntityId>, PoolError> {
        if let Some(limit) = self.rent_limit {
            if self.outstanding() >= limit {
                log::warn!("entity buffer pool exhausted: {limit} buffers outstanding");
                return Err(PoolError::Exhausted { requested: capacity });
            }
        }

        let bucket = Self::bucket_for(capacity);
        let reused = {
            let mut buckets = self.buckets.lock().unwrap();
            buckets.get_mut(&bucket).and_then(Vec::pop)
        };

        self.rented.fetch_add(1, Ordering::Relaxed);
        Ok(reused.unwrap_or_else(|| Vec::with_capacity(bucket)))
    }

    fn recycle(&self, mut buffer: Vec<EntityId>) {
        buffer.clear();

        // Largest power-of-two bucket the buffer can still serve.
        let bucket = if buffer.capacity() < MIN_BUCKET_CAPACITY {
            MIN_BUCKET_CAPACITY
        } else {
            let zeros = buffer.capacity().leading_zeros();
            1usize << (usize::BITS - 1 - zeros)
        };

        let mut buckets = self.buckets.lock().unwrap();
        buckets.entry(bucket).or_default().push(buffer);
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }
}
