//! Stable identity for a [`crate::want::Want`].

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

/// Fixed seeds for deterministic id derivation (§8 property 1). Any four
/// constants work as long as they never change between releases; changing
/// them would reassign every recipe-expanded child's id.
const DERIVE_SEEDS: (u64, u64, u64, u64) = (
    0x6d79_7761_6e74_2d31,
    0x6d79_7761_6e74_2d32,
    0x6d79_7761_6e74_2d33,
    0x6d79_7761_6e74_2d34,
);

/// A unique, stable identifier for a want.
///
/// Ids are never reused within a process lifetime (invariant 1 in §3):
/// allocation is the Config Store's job ([`mywant_runtime::config_store`]),
/// this type only carries the value around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WantId(u64);

impl WantId {
    /// Construct a `WantId` from a raw value.
    ///
    /// Callers outside the Config Store should only ever do this when
    /// deserializing a previously-allocated id (e.g. from a memory-dump
    /// file or a `QueryWant` round-trip), never to mint a fresh one.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// The raw numeric value, for persistence or logging.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Derive an id deterministically from a namespace and a sequence of
    /// parts, so the same inputs always produce the same id.
    ///
    /// The Recipe Expander uses this instead of an incrementing counter:
    /// expansion runs again every reconciler tick (§4.F step 2), and §8
    /// property 1 requires two successive expansions of the same
    /// `(recipe, params, prefix)` to produce byte-identical want sets,
    /// which an incrementing allocator can't guarantee once expansion
    /// itself is re-run.
    #[must_use]
    pub fn derive(namespace: &str, parts: &[&str]) -> Self {
        let build_hasher = RandomState::with_seeds(
            DERIVE_SEEDS.0,
            DERIVE_SEEDS.1,
            DERIVE_SEEDS.2,
            DERIVE_SEEDS.3,
        );
        let mut hasher = build_hasher.build_hasher();
        namespace.hash(&mut hasher);
        for part in parts {
            0xFFu8.hash(&mut hasher); // separator, avoids "ab","c" colliding with "a","bc"
            part.hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}

impl fmt::Display for WantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "want-{}", self.0)
    }
}
