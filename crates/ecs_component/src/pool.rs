//! Per-type object pools.
//!
//! A [`ComponentPool`] is a slab of instances of one component type plus a
//! free list. Acquiring hands out a slot (reusing a reset instance when one
//! is free), releasing resets the instance and pushes the slot back. Slots
//! remember which entity currently owns them so a cached handle can detect
//! that its instance has moved on.

use std::any::Any;

use serde::Serialize;

use crate::component::{Component, ComponentMeta};
use crate::entity::Entity;

/// Index of an instance inside its type's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentSlot(pub u32);

impl ComponentSlot {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Usage counters for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Component type name.
    pub name: &'static str,
    /// Instances currently owned by an entity.
    pub used: usize,
    /// Instances ever allocated (used + free).
    pub size: usize,
    /// Whether released instances are reused.
    pub pooled: bool,
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    owner: Option<Entity>,
}

/// Slab storage and free list for one component type.
#[derive(Debug)]
pub struct ComponentPool<T: Component> {
    meta: ComponentMeta,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T: Component> ComponentPool<T> {
    /// Create a pool, preallocating `capacity` default instances when the
    /// type is pooled.
    #[must_use]
    pub fn new(meta: ComponentMeta, capacity: usize) -> Self {
        let mut pool = Self {
            meta,
            slots: Vec::new(),
            free: Vec::new(),
        };
        if T::POOLED && capacity > 0 {
            pool.slots.reserve(capacity);
            pool.free.reserve(capacity);
            for i in (0..capacity).rev() {
                pool.free.push(i as u32);
            }
            pool.slots.extend((0..capacity).map(|_| Slot {
                value: T::default(),
                owner: None,
            }));
        }
        pool
    }

    /// Hand out a default-valued instance to `owner`.
    pub fn acquire(&mut self, owner: Entity) -> ComponentSlot {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize].owner = Some(owner);
            return ComponentSlot(index);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            value: T::default(),
            owner: Some(owner),
        });
        ComponentSlot(index)
    }

    /// Reset the instance in `slot` and make it available again.
    ///
    /// Releasing a slot twice without an acquire in between is a caller bug.
    pub fn release(&mut self, slot: ComponentSlot) {
        let entry = &mut self.slots[slot.index()];
        debug_assert!(
            entry.owner.is_some(),
            "double release of {}",
            self.meta.name
        );
        if T::POOLED {
            entry.value.reset();
        } else {
            entry.value = T::default();
        }
        entry.owner = None;
        self.free.push(slot.0);
    }

    /// The instance in `slot`, if `owner` currently owns it.
    #[must_use]
    pub fn get(&self, slot: ComponentSlot, owner: Entity) -> Option<&T> {
        self.slots
            .get(slot.index())
            .filter(|s| s.owner == Some(owner))
            .map(|s| &s.value)
    }

    /// Mutable access to the instance in `slot`, if `owner` currently owns it.
    pub fn get_mut(&mut self, slot: ComponentSlot, owner: Entity) -> Option<&mut T> {
        self.slots
            .get_mut(slot.index())
            .filter(|s| s.owner == Some(owner))
            .map(|s| &mut s.value)
    }

    /// Number of instances owned by an entity.
    #[must_use]
    pub fn used(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of instances allocated.
    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.len()
    }
}

/// Type-erased view of a [`ComponentPool`], so the registry can keep pools
/// of every type in one table.
pub trait ErasedPool: Any {
    fn meta(&self) -> &ComponentMeta;
    fn release(&mut self, slot: ComponentSlot);
    fn owner(&self, slot: ComponentSlot) -> Option<Entity>;
    fn stats(&self) -> PoolStats;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedPool for ComponentPool<T> {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn release(&mut self, slot: ComponentSlot) {
        ComponentPool::release(self, slot);
    }

    fn owner(&self, slot: ComponentSlot) -> Option<Entity> {
        self.slots.get(slot.index()).and_then(|s| s.owner)
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.meta.name,
            used: self.used(),
            size: self.size(),
            pooled: self.meta.pooled,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
