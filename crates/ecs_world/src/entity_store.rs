//! Entity table, component attachment, and deferred removal.
//!
//! The [`EntityStore`] owns one [`EntityRecord`] per tracked entity. Records
//! are recycled through a pool; ids are not. Every change to an entity's
//! component set is reported to the [`QueryIndex`] before the call returns,
//! so query membership is always current.
//!
//! ## Deferred removal
//!
//! A deferred `remove_component` detaches the type from the entity's active
//! set right away but parks the instance in a pending list. The instance
//! stays readable through the "include removed" accessors until
//! [`EntityStore::process_deferred_removal`] returns it to its pool at the
//! end of the tick. Entity removal works the same way: the entity stops
//! being alive immediately and its record is released at the flush, once
//! every component is gone.

use std::collections::BTreeMap;

use ecs_component::{
    Component, ComponentRegistry, ComponentSlot, ComponentTypeId, Entity, EntityAllocator,
};
use tracing::{debug, error};

use crate::error::EcsError;
use crate::query_index::{QueryId, QueryIndex};

/// Bookkeeping for one entity.
#[derive(Debug)]
pub struct EntityRecord {
    id: Entity,
    alive: bool,
    /// Queued for release at the next flush.
    queued: bool,
    /// Attached components, in attachment order.
    components: Vec<(ComponentTypeId, ComponentSlot)>,
    /// Components detached by a deferred removal, awaiting the flush.
    pending: Vec<(ComponentTypeId, ComponentSlot)>,
    /// Queries this entity currently belongs to. Maintained by the query index.
    pub(crate) queries: Vec<QueryId>,
}

impl EntityRecord {
    fn new() -> Self {
        Self {
            id: Entity::NULL,
            alive: false,
            queued: false,
            components: Vec::new(),
            pending: Vec::new(),
            queries: Vec::new(),
        }
    }

    /// Clear the record for reuse, keeping its allocations.
    fn reset(&mut self) {
        self.id = Entity::NULL;
        self.alive = false;
        self.queued = false;
        self.components.clear();
        self.pending.clear();
        self.queries.clear();
    }

    #[must_use]
    pub fn id(&self) -> Entity {
        self.id
    }

    /// `false` once the entity has been removed, even while it is still
    /// tracked because of pending releases or system-state components.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Returns `true` if `ty` is in the active component set.
    #[must_use]
    pub fn has(&self, ty: ComponentTypeId) -> bool {
        self.components.iter().any(|(t, _)| *t == ty)
    }

    /// Returns `true` if an instance of `ty` is awaiting release.
    #[must_use]
    pub fn has_removed(&self, ty: ComponentTypeId) -> bool {
        self.pending.iter().any(|(t, _)| *t == ty)
    }

    /// Slot of the active instance of `ty`.
    #[must_use]
    pub fn slot(&self, ty: ComponentTypeId) -> Option<ComponentSlot> {
        self.components
            .iter()
            .find(|(t, _)| *t == ty)
            .map(|(_, s)| *s)
    }

    /// Slot of the instance of `ty` awaiting release.
    #[must_use]
    pub fn removed_slot(&self, ty: ComponentTypeId) -> Option<ComponentSlot> {
        self.pending.iter().find(|(t, _)| *t == ty).map(|(_, s)| *s)
    }

    /// Active component types, in attachment order.
    pub fn component_types(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.components.iter().map(|(t, _)| *t)
    }

    /// Number of active components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Queries this entity currently belongs to.
    #[must_use]
    pub fn queries(&self) -> &[QueryId] {
        &self.queries
    }

    fn ready_for_release(&self) -> bool {
        !self.alive && self.components.is_empty()
    }
}

/// Outcome of one end-of-tick flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Entity records returned to the pool.
    pub entities_released: usize,
    /// Component instances returned to their pools.
    pub components_released: usize,
}

/// Owner of the entity table.
#[derive(Debug)]
pub struct EntityStore {
    allocator: EntityAllocator,
    /// Tracked entities. Ids are monotonic, so iteration follows creation order.
    live: BTreeMap<Entity, EntityRecord>,
    /// Reset records ready for reuse.
    pool: Vec<EntityRecord>,
    /// Entities to release at the next flush.
    to_release: Vec<Entity>,
    /// Entities holding pending component removals.
    with_pending: Vec<Entity>,
}

impl EntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a store with `capacity` preallocated entity records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            allocator: EntityAllocator::new(),
            live: BTreeMap::new(),
            pool: (0..capacity).map(|_| EntityRecord::new()).collect(),
            to_release: Vec::new(),
            with_pending: Vec::new(),
        }
    }

    /// Create a live entity with no components.
    pub fn create_entity(&mut self, queries: &mut QueryIndex) -> Entity {
        let mut record = self.pool.pop().unwrap_or_else(EntityRecord::new);
        let id = self.allocator.allocate();
        record.id = id;
        record.alive = true;
        queries.on_entity_created(&mut record);
        self.live.insert(id, record);
        id
    }

    /// Attach a `T` to `entity`, running `init` on the fresh instance.
    ///
    /// Returns `Ok(false)` without touching the existing instance if the
    /// entity already has `T`.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] for an untracked handle,
    /// [`EcsError::EntityRemoved`] if the entity was already removed.
    pub fn add_component<T: Component>(
        &mut self,
        registry: &mut ComponentRegistry,
        queries: &mut QueryIndex,
        entity: Entity,
        init: impl FnOnce(&mut T),
    ) -> Result<bool, EcsError> {
        let record = self
            .live
            .get_mut(&entity)
            .ok_or(EcsError::EntityNotFound(entity))?;
        if !record.alive {
            return Err(EcsError::EntityRemoved(entity));
        }
        let ty = registry.register::<T>();
        if record.has(ty) {
            return Ok(false);
        }
        // Re-adding a type removed earlier in the tick drops the pending
        // instance, so one entity never holds two of the same type.
        if let Some(previous) = record.pending.iter().position(|(t, _)| *t == ty) {
            let (_, stale) = record.pending.swap_remove(previous);
            registry.release(ty, stale);
        }

        let (_, slot) = registry.acquire::<T>(entity);
        if let Some(instance) = registry.get_mut::<T>(slot, entity) {
            init(instance);
        }
        record.components.push((ty, slot));
        queries.notify(record, ty);
        Ok(true)
    }

    /// Detach `ty` from `entity`.
    ///
    /// With `immediate` the instance goes straight back to its pool.
    /// Otherwise it stays readable as a removed component until the next
    /// flush. Returns `Ok(false)` if the entity did not have `ty`.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] for an untracked handle.
    pub fn remove_component(
        &mut self,
        registry: &mut ComponentRegistry,
        queries: &mut QueryIndex,
        entity: Entity,
        ty: ComponentTypeId,
        immediate: bool,
    ) -> Result<bool, EcsError> {
        let record = self
            .live
            .get_mut(&entity)
            .ok_or(EcsError::EntityNotFound(entity))?;
        let Some(index) = record.components.iter().position(|(t, _)| *t == ty) else {
            return Ok(false);
        };
        let (_, slot) = record.components.remove(index);

        if immediate {
            registry.release(ty, slot);
        } else {
            if record.pending.is_empty() {
                self.with_pending.push(entity);
            }
            record.pending.push((ty, slot));
        }

        queries.notify(record, ty);

        if record.ready_for_release() {
            self.retire(registry, queries, entity, immediate);
        }
        Ok(true)
    }

    /// Detach every component except system-state ones.
    ///
    /// Returns the number of components removed.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] for an untracked handle.
    pub fn remove_all_components(
        &mut self,
        registry: &mut ComponentRegistry,
        queries: &mut QueryIndex,
        entity: Entity,
        immediate: bool,
    ) -> Result<usize, EcsError> {
        let record = self
            .live
            .get(&entity)
            .ok_or(EcsError::EntityNotFound(entity))?;
        let doomed: Vec<ComponentTypeId> = record
            .component_types()
            .filter(|ty| registry.meta(*ty).is_none_or(|m| !m.is_system_state()))
            .collect();

        let mut removed = 0;
        for ty in doomed {
            let detached =
                self.remove_component(registry, queries, entity, ty, immediate)?;
            if detached {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove `entity`: it stops being alive now, loses every non
    /// system-state component, and its record is released once no
    /// component remains (at the flush, or now with `immediate`).
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] for an untracked handle and
    /// [`EcsError::EntityRemoved`] for a second removal. Both are logged.
    pub fn remove_entity(
        &mut self,
        registry: &mut ComponentRegistry,
        queries: &mut QueryIndex,
        entity: Entity,
        immediate: bool,
    ) -> Result<(), EcsError> {
        let Some(record) = self.live.get_mut(&entity) else {
            error!(
                %entity,
                released = self.allocator.was_issued(entity),
                "tried to remove an entity that is not tracked"
            );
            return Err(EcsError::EntityNotFound(entity));
        };
        if !record.alive {
            error!(%entity, "tried to remove an entity twice");
            return Err(EcsError::EntityRemoved(entity));
        }
        record.alive = false;

        self.remove_all_components(registry, queries, entity, immediate)?;

        if self
            .live
            .get(&entity)
            .is_some_and(EntityRecord::ready_for_release)
        {
            self.retire(registry, queries, entity, immediate);
        }
        Ok(())
    }

    /// Remove every alive entity (deferred).
    pub fn remove_all_entities(
        &mut self,
        registry: &mut ComponentRegistry,
        queries: &mut QueryIndex,
    ) {
        let alive: Vec<Entity> = self
            .live
            .values()
            .filter(|r| r.alive)
            .map(|r| r.id)
            .collect();
        for entity in alive {
            let removed = self.remove_entity(registry, queries, entity, false);
            debug_assert!(
                removed.is_ok(),
                "alive entity {entity} could not be removed"
            );
        }
    }

    /// Release queued entities and pending component instances.
    ///
    /// Runs once per tick, after every system.
    pub fn process_deferred_removal(
        &mut self,
        registry: &mut ComponentRegistry,
        queries: &mut QueryIndex,
    ) -> FlushSummary {
        let mut summary = FlushSummary::default();

        let mut to_release = std::mem::take(&mut self.to_release);
        for entity in to_release.drain(..) {
            summary.components_released += self.release_entity(registry, queries, entity);
            summary.entities_released += 1;
        }
        self.to_release = to_release;

        let mut with_pending = std::mem::take(&mut self.with_pending);
        for entity in with_pending.drain(..) {
            if let Some(record) = self.live.get_mut(&entity) {
                for (ty, slot) in record.pending.drain(..) {
                    registry.release(ty, slot);
                    summary.components_released += 1;
                }
            }
        }
        self.with_pending = with_pending;

        if summary != FlushSummary::default() {
            debug!(
                entities = summary.entities_released,
                components = summary.components_released,
                "processed deferred removal"
            );
        }
        summary
    }

    /// The record of a tracked entity.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&EntityRecord> {
        self.live.get(&entity)
    }

    /// Returns `true` if `entity` is tracked and not removed.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.live.get(&entity).is_some_and(|r| r.alive)
    }

    /// Tracked records, in creation order.
    pub fn records(&self) -> impl Iterator<Item = &EntityRecord> {
        self.live.values()
    }

    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut EntityRecord> {
        self.live.values_mut()
    }

    /// Number of tracked entities, including removed ones awaiting release.
    #[must_use]
    pub fn count(&self) -> usize {
        self.live.len()
    }

    /// Number of tracked entities that are still alive.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.live.values().filter(|r| r.alive).count()
    }

    /// Number of reset records waiting in the pool.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.pool.len()
    }

    /// Number of entities queued for release at the next flush.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.to_release.len()
    }

    /// Queue a removed, component-less entity for release, or release it
    /// now when `immediate`.
    fn retire(
        &mut self,
        registry: &mut ComponentRegistry,
        queries: &mut QueryIndex,
        entity: Entity,
        immediate: bool,
    ) {
        if immediate {
            self.to_release.retain(|e| *e != entity);
            self.release_entity(registry, queries, entity);
        } else if let Some(record) = self.live.get_mut(&entity)
            && !record.queued
        {
            record.queued = true;
            self.to_release.push(entity);
        }
    }

    /// Drop `entity` from the table and return its record to the pool.
    /// Returns the number of component instances released with it.
    fn release_entity(
        &mut self,
        registry: &mut ComponentRegistry,
        queries: &mut QueryIndex,
        entity: Entity,
    ) -> usize {
        let Some(mut record) = self.live.remove(&entity) else {
            return 0;
        };
        let mut released = 0;
        for (ty, slot) in record.pending.drain(..).chain(record.components.drain(..)) {
            registry.release(ty, slot);
            released += 1;
        }
        queries.on_entity_released(&mut record);
        record.reset();
        self.pool.push(record);
        released
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
