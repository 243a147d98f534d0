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

//! Error taxonomy for the query-result cache.

use taiga_core::ecs::TraversalError;
use taiga_core::memory::PoolError;
use thiserror::Error;

/// Errors surfaced by the query-result cache and its executor shim.
///
/// Cache-internal races (stale-entry detection, concurrent populates of
/// the same key) are resolved internally and never reach callers; from
/// the caller's point of view the cache only fails for configuration
/// and allocator errors, plus failures of the underlying traversal.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A cached result was read after its buffer had been returned to
    /// the pool.
    #[error("cached result is disposed; its buffer has been returned to the pool")]
    ResultDisposed,

    /// The configuration was rejected at construction.
    #[error("invalid cache configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// The buffer pool could not supply a buffer on the miss path.
    #[error("entity buffer pool failure")]
    PoolExhausted(#[from] PoolError),

    /// The storage engine failed while collecting matching entities.
    #[error("archetype traversal failed")]
    Traversal(#[from] TraversalError),
}

/// Convenience alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
