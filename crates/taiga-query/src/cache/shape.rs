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

//! Structural description of a query before it is keyed.

use taiga_core::ecs::ComponentTypeId;

/// The structural identity of a query: which component types
/// participate in each filter clause.
///
/// Built incrementally in builder style; the order in which types are
/// declared never matters, because [`CacheKey`](crate::cache::CacheKey)
/// canonicalizes the shape before it is used for lookup.
///
/// ## Example
/// ```
/// use taiga_core::ecs::ComponentTypeId;
/// use taiga_query::cache::QueryShape;
///
/// let shape = QueryShape::new()
///     .with_all(ComponentTypeId(0))
///     .with_all(ComponentTypeId(1))
///     .with_none(ComponentTypeId(2));
/// assert_eq!(shape.all_of().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryShape {
    all_of: Vec<ComponentTypeId>,
    none_of: Vec<ComponentTypeId>,
    any_of: Vec<ComponentTypeId>,
}

impl QueryShape {
    /// Creates an empty shape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires matching entities to carry the component type `id`.
    pub fn with_all(mut self, id: ComponentTypeId) -> Self {
        self.all_of.push(id);
        self
    }

    /// Excludes entities carrying the component type `id`.
    pub fn with_none(mut self, id: ComponentTypeId) -> Self {
        self.none_of.push(id);
        self
    }

    /// Requires matching entities to carry at least one of the types
    /// added through this clause.
    pub fn with_any(mut self, id: ComponentTypeId) -> Self {
        self.any_of.push(id);
        self
    }

    /// The "all of" clause, in declaration order.
    pub fn all_of(&self) -> &[ComponentTypeId] {
        &self.all_of
    }

    /// The "none of" clause, in declaration order.
    pub fn none_of(&self) -> &[ComponentTypeId] {
        &self.none_of
    }

    /// The "any of" clause, in declaration order.
    pub fn any_of(&self) -> &[ComponentTypeId] {
        &self.any_of
    }

    /// The component types whose mutation can change this query's
    /// result set, sorted and deduplicated.
    ///
    /// Every clause contributes: an entity gaining or losing a
    /// `none_of` type changes membership just as surely as one of the
    /// positive types does.
    pub fn dependent_types(&self) -> Vec<ComponentTypeId> {
        let mut ids: Vec<ComponentTypeId> = self
            .all_of
            .iter()
            .chain(self.none_of.iter())
            .chain(self.any_of.iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}
