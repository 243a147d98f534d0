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

//! # Taiga Query
//!
//! A query-result cache for the taiga ECS runtime: memoizes the set of
//! entities matching a component-shape query so that repeated
//! executions of the same shape skip archetype traversal entirely until
//! the entity population changes in a relevant way.
//!
//! The main entry points are [`cache::QueryResultCache`] (the container,
//! with its invalidation policies and LRU eviction) and
//! [`cache::CachedQueryExecutor`] (the shim that threads the cache into
//! ordinary query execution).

#![warn(missing_docs)]

pub mod cache;
