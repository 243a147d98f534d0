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

//! The storage-side contract the query layer invokes on a cache miss.

use crate::ecs::{ComponentTypeId, EntityId};
use std::fmt;

/// An error reported by the storage engine while scanning for matching
/// entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalError {
    /// A component type named by the query was never registered.
    UnknownComponentType(ComponentTypeId),
    /// The storage engine could not complete the scan.
    StorageUnavailable(String),
}

impl fmt::Display for TraversalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalError::UnknownComponentType(id) => {
                write!(f, "Unknown component type in query: {id:?}")
            }
            TraversalError::StorageUnavailable(details) => {
                write!(f, "Archetype storage unavailable: {details}")
            }
        }
    }
}

impl std::error::Error for TraversalError {}

/// The archetype traversal primitive: "given a query shape, produce the
/// matching entity identities".
///
/// Implemented by the archetype storage engine, which owns the grouping
/// of entities by component shape. The query layer only depends on this
/// boundary; it never inspects storage internals.
pub trait ArchetypeTraversal: Send + Sync {
    /// Appends every entity matching the given clauses to `out` and
    /// returns how many entities were written.
    ///
    /// The clause slices are sorted, deduplicated component ids as
    /// produced by the query layer: an entity matches when it carries
    /// all of `all_of`, none of `none_of`, and (if `any_of` is
    /// non-empty) at least one of `any_of`.
    ///
    /// On error nothing may be left half-written in a way the caller
    /// cannot discard: the caller treats `out` as garbage and recycles it.
    fn collect_matching(
        &self,
        all_of: &[ComponentTypeId],
        none_of: &[ComponentTypeId],
        any_of: &[ComponentTypeId],
        out: &mut Vec<EntityId>,
    ) -> Result<usize, TraversalError>;
}
