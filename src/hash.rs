use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;

/// Keyed 64-bit hash over raw key bytes.
///
/// Seeded per instance, so probe layouts differ between tables and a
/// remote party cannot precompute colliding keys. All table invariants
/// are layout-agnostic, nothing depends on the concrete function.
#[derive(Debug)]
pub(crate) struct KeyHasher {
    state: RandomState,
}

impl KeyHasher {
    pub(crate) fn new() -> Self {
        Self {
            state: RandomState::new(),
        }
    }

    #[inline]
    pub(crate) fn hash(&self, key: &[u8]) -> u64 {
        let mut hasher = self.state.build_hasher();
        hasher.write(key);
        hasher.finish()
    }
}
