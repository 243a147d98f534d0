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

//! Construction-time configuration for the query-result cache.

use crate::cache::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};

/// Policy governing when cached results are considered stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationMode {
    /// Any invalidation makes every cached result stale. Safest and
    /// cheapest to maintain, but the whole cache repopulates after
    /// every structural change.
    Global,
    /// Only results depending on a modified component type go stale;
    /// unrelated cached queries survive.
    ComponentBased,
    /// The whole cache goes stale at every frame boundary: within one
    /// frame the first touch of a key misses and every later touch
    /// hits.
    PerFrame,
}

/// Configuration for [`QueryResultCache`](crate::cache::QueryResultCache).
///
/// Passed once at construction and fixed for the cache's lifetime; it
/// is not reloadable mid-session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Master switch. A disabled cache degrades transparently to the
    /// uncached traversal path.
    pub enabled: bool,
    /// The invalidation policy.
    pub mode: InvalidationMode,
    /// Upper bound on resident cached queries before LRU eviction.
    pub max_cached_queries: usize,
    /// Results with fewer entities than this bypass the cache: caching
    /// tiny results costs more than it saves.
    pub min_entities_to_cache: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: InvalidationMode::Global,
            max_cached_queries: 64,
            min_entities_to_cache: 16,
        }
    }
}

impl CacheConfig {
    /// Validates the configuration, failing fast at startup.
    ///
    /// Limits are never silently clamped; a nonsensical value is a
    /// construction error.
    pub fn validate(&self) -> CacheResult<()> {
        if self.max_cached_queries < 1 {
            return Err(CacheError::InvalidConfig {
                reason: format!(
                    "max_cached_queries must be at least 1, got {}",
                    self.max_cached_queries
                ),
            });
        }
        Ok(())
    }
}
