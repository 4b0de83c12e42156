//! Component registry: one pool per component type.
//!
//! The registry issues [`ComponentTypeId`] handles and owns the matching
//! [`ComponentPool`]s in a table indexed by handle. Registration is
//! idempotent and implicit: acquiring an unknown type registers it first.

use std::any::TypeId;
use std::collections::HashMap;

use tracing::debug;

use crate::component::{Component, ComponentMeta, ComponentTypeId};
use crate::entity::Entity;
use crate::pool::{ComponentPool, ComponentSlot, ErasedPool, PoolStats};

/// Owner of every component pool.
pub struct ComponentRegistry {
    /// Handles keyed by Rust type.
    ids: HashMap<TypeId, ComponentTypeId>,
    /// Pools indexed by [`ComponentTypeId`].
    pools: Vec<Box<dyn ErasedPool>>,
    /// Instances preallocated for each newly registered pooled type.
    initial_capacity: usize,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty registry whose pools preallocate `capacity` instances.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashMap::new(),
            pools: Vec::new(),
            initial_capacity: capacity,
        }
    }

    /// Register `T`, creating its pool if absent. Returns the type's handle.
    pub fn register<T: Component>(&mut self) -> ComponentTypeId {
        if let Some(&id) = self.ids.get(&TypeId::of::<T>()) {
            return id;
        }
        let id = ComponentTypeId(self.pools.len() as u32);
        let meta = ComponentMeta::of::<T>(id);
        debug!(
            component = meta.name,
            id = id.0,
            pooled = meta.pooled,
            kind = ?meta.kind,
            "registered component type"
        );
        let pool = ComponentPool::<T>::new(meta, self.initial_capacity);
        self.pools.push(Box::new(pool));
        self.ids.insert(TypeId::of::<T>(), id);
        id
    }

    /// The handle for `T`, if it has been registered.
    #[must_use]
    pub fn id_of<T: Component>(&self) -> Option<ComponentTypeId> {
        self.ids.get(&TypeId::of::<T>()).copied()
    }

    /// Take a default-valued `T` from its pool on behalf of `owner`.
    pub fn acquire<T: Component>(&mut self, owner: Entity) -> (ComponentTypeId, ComponentSlot) {
        let id = self.register::<T>();
        let slot = self.pool_mut::<T>(id).acquire(owner);
        (id, slot)
    }

    /// Reset the instance in `slot` and return it to the pool of `id`.
    ///
    /// Must be called exactly once per acquired slot.
    pub fn release(&mut self, id: ComponentTypeId, slot: ComponentSlot) {
        self.pools[id.index()].release(slot);
    }

    /// The instance of `T` in `slot`, if `owner` holds it.
    #[must_use]
    pub fn get<T: Component>(&self, slot: ComponentSlot, owner: Entity) -> Option<&T> {
        let id = self.id_of::<T>()?;
        self.pools[id.index()]
            .as_any()
            .downcast_ref::<ComponentPool<T>>()?
            .get(slot, owner)
    }

    /// Mutable access to the instance of `T` in `slot`, if `owner` holds it.
    pub fn get_mut<T: Component>(&mut self, slot: ComponentSlot, owner: Entity) -> Option<&mut T> {
        let id = self.id_of::<T>()?;
        self.pools[id.index()]
            .as_any_mut()
            .downcast_mut::<ComponentPool<T>>()?
            .get_mut(slot, owner)
    }

    /// Mutable access to two instances of different types at once.
    ///
    /// Returns `None` when `A` and `B` are the same type or either instance
    /// is not held by its owner.
    pub fn get_pair_mut<A: Component, B: Component>(
        &mut self,
        (slot_a, owner_a): (ComponentSlot, Entity),
        (slot_b, owner_b): (ComponentSlot, Entity),
    ) -> Option<(&mut A, &mut B)> {
        let a = self.id_of::<A>()?.index();
        let b = self.id_of::<B>()?.index();
        if a == b {
            return None;
        }
        let (pool_a, pool_b) = if a < b {
            let (low, high) = self.pools.split_at_mut(b);
            (&mut low[a], &mut high[0])
        } else {
            let (low, high) = self.pools.split_at_mut(a);
            (&mut high[0], &mut low[b])
        };
        let value_a = pool_a
            .as_any_mut()
            .downcast_mut::<ComponentPool<A>>()?
            .get_mut(slot_a, owner_a)?;
        let value_b = pool_b
            .as_any_mut()
            .downcast_mut::<ComponentPool<B>>()?
            .get_mut(slot_b, owner_b)?;
        Some((value_a, value_b))
    }

    /// Metadata for a registered handle.
    #[must_use]
    pub fn meta(&self, id: ComponentTypeId) -> Option<&ComponentMeta> {
        self.pools.get(id.index()).map(|p| p.meta())
    }

    /// Display name for a handle, `"?"` if unknown.
    #[must_use]
    pub fn name(&self, id: ComponentTypeId) -> &'static str {
        self.meta(id).map_or("?", |m| m.name)
    }

    /// The entity currently holding `slot` in the pool of `id`.
    #[must_use]
    pub fn owner(&self, id: ComponentTypeId, slot: ComponentSlot) -> Option<Entity> {
        self.pools.get(id.index()).and_then(|p| p.owner(slot))
    }

    /// Number of registered component types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.pools.len()
    }

    /// Usage counters for every pool, in registration order.
    #[must_use]
    pub fn stats(&self) -> Vec<PoolStats> {
        self.pools.iter().map(|p| p.stats()).collect()
    }

    fn pool_mut<T: Component>(&mut self, id: ComponentTypeId) -> &mut ComponentPool<T> {
        self.pools[id.index()]
            .as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
            .unwrap_or_else(|| unreachable!("pool {} holds another type", id.0))
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.pools.len())
            .field("initial_capacity", &self.initial_capacity)
            .finish()
    }
}
