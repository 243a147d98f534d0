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

//! Cache statistics: live atomic counters and point-in-time snapshots.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one cache instance.
///
/// Owned by the cache rather than declared as process-wide statics, so
/// independent caches (per test, per world) never share state. All
/// counters are updated with relaxed atomics; they are telemetry, not
/// synchronization.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups served from a valid cached result.
    pub(crate) hits: AtomicU64,
    /// Lookups that found nothing usable.
    pub(crate) misses: AtomicU64,
    /// Invalidation operations (global, per-type, or frame boundary).
    pub(crate) invalidations: AtomicU64,
    /// Entries removed by LRU eviction.
    pub(crate) evictions: AtomicU64,
    /// Number of currently resident cached queries.
    pub(crate) cached_queries: AtomicU64,
    /// Estimated bytes retained by resident results.
    pub(crate) resident_bytes: AtomicU64,
}

impl CacheStats {
    /// Records a newly resident result of the given estimated size.
    pub(crate) fn add_resident(&self, bytes: u64) {
        self.cached_queries.fetch_add(1, Ordering::Relaxed);
        self.resident_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records the removal of a resident result.
    pub(crate) fn remove_resident(&self, bytes: u64) {
        self.cached_queries.fetch_sub(1, Ordering::Relaxed);
        self.resident_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Copies all counters into a snapshot.
    ///
    /// Counters are read individually; under concurrent load the
    /// snapshot is consistent per field, not across fields.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            invalidation_count: self.invalidations.load(Ordering::Relaxed),
            eviction_count: self.evictions.load(Ordering::Relaxed),
            cached_query_count: self.cached_queries.load(Ordering::Relaxed),
            estimated_bytes: self.resident_bytes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the cache counters, suitable for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Lookups served from a valid cached result.
    pub hit_count: u64,
    /// Lookups that found nothing usable.
    pub miss_count: u64,
    /// Invalidation operations performed.
    pub invalidation_count: u64,
    /// Entries removed by LRU eviction.
    pub eviction_count: u64,
    /// Currently resident cached queries.
    pub cached_query_count: u64,
    /// Estimated bytes retained by resident results.
    pub estimated_bytes: u64,
}

impl CacheStatsSnapshot {
    /// Serializes the snapshot as a JSON object for log and telemetry
    /// sinks.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} invalidations={} evictions={} resident={} (~{} bytes)",
            self.hit_count,
            self.miss_count,
            self.invalidation_count,
            self.eviction_count,
            self.cached_query_count,
            self.estimated_bytes
        )
    }
}
