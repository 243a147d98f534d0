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

//! Immutable, structurally-comparable cache keys for query shapes.

use crate::cache::QueryShape;
use std::hash::{Hash, Hasher};
use taiga_core::ecs::ComponentTypeId;

/// Flags recording which filter clauses participate in a query.
///
/// Two queries over the same component types but with different filter
/// semantics must produce distinct keys; these flags are part of the
/// key's structural identity. Multiple clauses combine with bitwise or.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryFilterFlags {
    bits: u8,
}

impl QueryFilterFlags {
    /// No filter clauses.
    pub const NONE: Self = Self { bits: 0 };
    /// The query has an "all of" clause.
    pub const ALL_OF: Self = Self { bits: 1 << 0 };
    /// The query has a "none of" clause.
    pub const NONE_OF: Self = Self { bits: 1 << 1 };
    /// The query has an "any of" clause.
    pub const ANY_OF: Self = Self { bits: 1 << 2 };

    /// Creates flags from raw bits.
    pub const fn from_bits(bits: u8) -> Self {
        Self { bits }
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Returns the union of `self` and `other`.
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// True if every flag set in `other` is also set in `self`.
    pub const fn contains(&self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }
}

impl std::ops::BitOr for QueryFilterFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

// Clause salts occupy bits above any ComponentTypeId value, so a type
// required by one query and excluded by another can never alias in the
// canonical sequence.
const ALL_OF_SALT: u64 = 0;
const NONE_OF_SALT: u64 = 1 << 40;
const ANY_OF_SALT: u64 = 2 << 40;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// An immutable, structurally-comparable identity for a query shape.
///
/// Two logically identical queries hash and compare equal even when
/// their component type lists were declared in different order: the
/// type sequence is sorted (and deduplicated) at construction, which is
/// the only mutation point. Afterwards the key is freely shareable
/// across threads.
///
/// Equality holds **iff** the canonical type sequence, the filter
/// flags, and the arity are all equal. The precomputed hash is only a
/// cheap first rejection; hash-equal keys still undergo the full
/// structural comparison, so hash collisions can never produce a false
/// cache hit.
#[derive(Debug, Clone)]
pub struct CacheKey {
    /// Clause-salted component ids, sorted ascending, deduplicated.
    type_hashes: Vec<u64>,
    /// Which filter clauses the query uses.
    filter_flags: QueryFilterFlags,
    /// Number of bound component type parameters. Kept explicitly:
    /// the type sequence alone cannot distinguish arities when a bound
    /// type contributes no clause entry.
    arity: u8,
    /// Combined hash over (type sequence, flags, arity).
    precomputed_hash: u64,
}

impl CacheKey {
    /// Canonicalizes `shape` into a key.
    ///
    /// Pure and total: sorts and deduplicates the clause-salted type
    /// ids, derives the filter flags from which clauses are non-empty,
    /// and precomputes the combined hash. `O(n log n)` in the number of
    /// participating types, which is small.
    pub fn from_shape(shape: &QueryShape, arity: u8) -> Self {
        fn salted<'a>(
            ids: &'a [ComponentTypeId],
            salt: u64,
        ) -> impl Iterator<Item = u64> + 'a {
            ids.iter().map(move |id| salt | u64::from(id.0))
        }

        let mut type_hashes: Vec<u64> = salted(shape.all_of(), ALL_OF_SALT)
            .chain(salted(shape.none_of(), NONE_OF_SALT))
            .chain(salted(shape.any_of(), ANY_OF_SALT))
            .collect();
        type_hashes.sort_unstable();
        type_hashes.dedup();

        let mut filter_flags = QueryFilterFlags::NONE;
        if !shape.all_of().is_empty() {
            filter_flags = filter_flags | QueryFilterFlags::ALL_OF;
        }
        if !shape.none_of().is_empty() {
            filter_flags = filter_flags | QueryFilterFlags::NONE_OF;
        }
        if !shape.any_of().is_empty() {
            filter_flags = filter_flags | QueryFilterFlags::ANY_OF;
        }

        let mut hash = FNV_OFFSET_BASIS;
        for &entry in &type_hashes {
            hash = fnv1a_mix(hash, entry);
        }
        hash = fnv1a_mix(hash, u64::from(filter_flags.bits()));
        hash = fnv1a_mix(hash, u64::from(arity));

        Self {
            type_hashes,
            filter_flags,
            arity,
            precomputed_hash: hash,
        }
    }

    /// The canonical (sorted, clause-salted) type sequence.
    pub fn type_hashes(&self) -> &[u64] {
        &self.type_hashes
    }

    /// Which filter clauses the keyed query uses.
    pub fn filter_flags(&self) -> QueryFilterFlags {
        self.filter_flags
    }

    /// Number of bound component type parameters.
    pub fn arity(&self) -> u8 {
        self.arity
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        // Hash mismatch rejects cheaply; hash equality is never trusted.
        self.precomputed_hash == other.precomputed_hash
            && self.arity == other.arity
            && self.filter_flags == other.filter_flags
            && self.type_hashes == other.type_hashes
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.precomputed_hash);
    }
}

/// Folds one value into an FNV-1a accumulator, byte by byte.
fn fnv1a_mix(mut hash: u64, value: u64) -> u64 {
    for byte in value.to_le_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
