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

//! Structurally-keyed memoization of archetype traversal results.
//!
//! A query shape (which component types, which filter clauses, how many
//! bound type parameters) is canonicalized into a [`CacheKey`]; the
//! matching entity set lives in a [`CachedResult`] that owns one pooled
//! buffer and guards it with a reader/disposer lock. The
//! [`QueryResultCache`] maps keys to results, drives one of three
//! invalidation policies (global, component-scoped, per-frame), and
//! bounds memory with LRU eviction. [`CachedQueryExecutor`] is the
//! integration point for callers: it consults the cache before a
//! traversal and populates it afterwards.

mod config;
mod error;
mod executor;
mod key;
mod result;
mod shape;
mod stats;
mod store;

pub use config::{CacheConfig, InvalidationMode};
pub use error::{CacheError, CacheResult};
pub use executor::*;
pub use key::{CacheKey, QueryFilterFlags};
pub use result::CachedResult;
pub use shape::QueryShape;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::QueryResultCache;

#[cfg(test)]
mod tests;
