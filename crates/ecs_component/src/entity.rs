//! Entity handles.
//!
//! An [`Entity`] carries no data; it only names a row in the entity store.
//! Records behind entities are pooled and reused, but handles are not:
//! every creation draws the next number from the [`EntityAllocator`], so a
//! handle kept after its entity was released can never reach a newer one.

use serde::{Deserialize, Serialize};

/// Handle to one entity.
///
/// Handles order by creation, which is also the order query projections
/// list their rows in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u64);

impl Entity {
    /// Placeholder held by pooled records. Never issued.
    pub const NULL: Entity = Entity(0);

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Returns `true` for [`Entity::NULL`].
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues entity handles, starting at 1.
#[derive(Debug)]
pub struct EntityAllocator {
    last: u64,
}

impl EntityAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// The next unused handle.
    pub fn allocate(&mut self) -> Entity {
        self.last += 1;
        Entity(self.last)
    }

    /// Number of handles issued so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.last
    }

    /// Returns `true` if `entity` came from this allocator, whether or not
    /// it is still tracked.
    #[must_use]
    pub fn was_issued(&self, entity: Entity) -> bool {
        !entity.is_null() && entity.0 <= self.last
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
