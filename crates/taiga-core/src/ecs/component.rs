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

//! Reflection-free component type identity.

use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;

/// A stable, dense integer identity for a component type.
///
/// Assigned once per type at startup by the [`ComponentRegistry`]. All
/// query-layer bookkeeping (cache keys, dependent-type sets) is keyed on
/// these integers rather than on runtime type tokens, which keeps key
/// construction `O(arity)` with small constants and free of per-call
/// reflection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ComponentTypeId(pub u32);

/// An arena-style registry assigning dense [`ComponentTypeId`]s to
/// component types in registration order.
///
/// The engine setup logic registers every known component type exactly
/// once; afterwards the registry is read-only and the mapping is stable
/// for the lifetime of the world.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    /// The core map from a component's `TypeId` to its assigned dense id.
    mapping: HashMap<TypeId, ComponentTypeId>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the component type `T`, returning its dense id.
    ///
    /// Registering the same type twice is a no-op and returns the id
    /// assigned by the first registration.
    pub fn register<T: 'static>(&mut self) -> ComponentTypeId {
        let next = ComponentTypeId(self.mapping.len() as u32);
        *self.mapping.entry(TypeId::of::<T>()).or_insert(next)
    }

    /// Looks up the id previously registered for `T`.
    pub fn type_id_of<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.mapping.get(&TypeId::of::<T>()).copied()
    }

    /// The number of registered component types.
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// True if no component type has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
