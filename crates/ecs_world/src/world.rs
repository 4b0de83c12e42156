//! The [`World`] facade.
//!
//! A world owns one component registry, one entity store, one query index
//! and one system scheduler, and exposes the single per-tick entry point
//! [`World::run`]. A tick runs every enabled system in registration order
//! and then flushes deferred removals.

use std::cell::RefMut;
use std::time::Instant;

use ecs_component::{Component, ComponentRegistry, ComponentTypeId, Entity, QueryDescriptor};
use tracing::{debug, info, trace, warn};

use crate::config::WorldConfig;
use crate::entity_store::{EntityStore, FlushSummary};
use crate::error::EcsError;
use crate::query_index::{QueryId, QueryIndex, QueryResults};
use crate::scheduler::{System, SystemEntry, SystemScheduler};
use crate::stats::{EntityStats, WorldStats};

/// Aggregate root of the runtime.
#[derive(Debug)]
pub struct World {
    components: ComponentRegistry,
    entities: EntityStore,
    queries: QueryIndex,
    systems: SystemScheduler,
    enabled: bool,
    tick: u64,
    /// Projection handles of the system currently running. Reused every tick.
    scratch: Vec<QueryResults>,
}

impl World {
    /// Create an empty world with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create an empty world with the given pool capacities.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            components: ComponentRegistry::with_capacity(config.component_pool_capacity),
            entities: EntityStore::with_capacity(config.entity_pool_capacity),
            queries: QueryIndex::new(),
            systems: SystemScheduler::new(),
            enabled: true,
            tick: 0,
            scratch: Vec::new(),
        }
    }

    // -- Tick --

    /// Run one tick: every enabled system in registration order, then the
    /// deferred-removal flush. Does nothing while the world is stopped.
    pub fn run(&mut self) {
        if !self.enabled {
            return;
        }
        self.tick += 1;

        // Systems registered during this tick start next tick.
        let systems = self.systems.snapshot();
        let mut scratch = std::mem::take(&mut self.scratch);

        for entry in &systems {
            if !entry.is_registered() || !entry.is_enabled() {
                continue;
            }
            if entry.mandatory().iter().any(|q| self.queries.is_empty(*q)) {
                trace!(
                    tick = self.tick,
                    system = entry.name(),
                    "mandatory query empty, skipping"
                );
                continue;
            }

            scratch.clear();
            for &query in entry.queries() {
                scratch.push(self.queries.prepare(query, &self.entities));
            }

            let start = Instant::now();
            if entry.run(self, &scratch) {
                let elapsed = start.elapsed();
                entry.record_run(elapsed);
                trace!(
                    tick = self.tick,
                    system = entry.name(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "ran system"
                );
            }
        }

        scratch.clear();
        self.scratch = scratch;
        self.process_deferred_removal();
    }

    /// Release every deferred component and entity removal now.
    ///
    /// [`World::run`] calls this once at the end of every tick.
    pub fn process_deferred_removal(&mut self) -> FlushSummary {
        self.entities
            .process_deferred_removal(&mut self.components, &mut self.queries)
    }

    /// Pause the world: [`World::run`] becomes a no-op, flush included.
    pub fn stop(&mut self) {
        if self.enabled {
            info!(tick = self.tick, "world stopped");
        }
        self.enabled = false;
    }

    /// Resume a stopped world.
    pub fn play(&mut self) {
        if !self.enabled {
            info!(tick = self.tick, "world resumed");
        }
        self.enabled = true;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of ticks run so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    // -- Components --

    /// Register `T` ahead of use. Adding a component registers its type
    /// implicitly, so this is only needed to control handle order or
    /// preallocate the pool.
    pub fn register_component<T: Component>(&mut self) -> ComponentTypeId {
        self.components.register::<T>()
    }

    /// The handle of `T`, if registered.
    #[must_use]
    pub fn component_type<T: Component>(&self) -> Option<ComponentTypeId> {
        self.components.id_of::<T>()
    }

    /// The component registry.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub(crate) fn components_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.components
    }

    // -- Entities --

    /// Create a live entity with no components.
    pub fn create_entity(&mut self) -> Entity {
        self.entities.create_entity(&mut self.queries)
    }

    /// Create an entity and return a chaining handle to it.
    pub fn spawn(&mut self) -> EntityMut<'_> {
        let entity = self.create_entity();
        EntityMut {
            world: self,
            entity,
        }
    }

    /// A chaining handle to an existing entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] if `entity` is not tracked.
    pub fn entity_mut(&mut self, entity: Entity) -> Result<EntityMut<'_>, EcsError> {
        if self.entities.get(entity).is_none() {
            return Err(EcsError::EntityNotFound(entity));
        }
        Ok(EntityMut {
            world: self,
            entity,
        })
    }

    /// Attach a default-valued `T`. Returns `Ok(false)` if already present.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is untracked or already removed.
    pub fn add_component<T: Component>(&mut self, entity: Entity) -> Result<bool, EcsError> {
        self.add_component_with::<T>(entity, |_| {})
    }

    /// Attach a `T`, letting `init` override the fields it cares about.
    ///
    /// `init` does not run if the entity already has `T`.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is untracked or already removed.
    pub fn add_component_with<T: Component>(
        &mut self,
        entity: Entity,
        init: impl FnOnce(&mut T),
    ) -> Result<bool, EcsError> {
        self.entities
            .add_component::<T>(&mut self.components, &mut self.queries, entity, init)
    }

    /// Attach `value` as the entity's `T`. The value is dropped if the
    /// entity already has `T`.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is untracked or already removed.
    pub fn insert_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<bool, EcsError> {
        self.add_component_with::<T>(entity, move |c| *c = value)
    }

    /// Detach `T`. Deferred unless `immediate`; see
    /// [`World::get_removed_component`]. Returns `Ok(false)` if absent.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] if `entity` is not tracked.
    pub fn remove_component<T: Component>(
        &mut self,
        entity: Entity,
        immediate: bool,
    ) -> Result<bool, EcsError> {
        let Some(ty) = self.components.id_of::<T>() else {
            return match self.entities.get(entity) {
                Some(_) => Ok(false),
                None => Err(EcsError::EntityNotFound(entity)),
            };
        };
        self.entities.remove_component(
            &mut self.components,
            &mut self.queries,
            entity,
            ty,
            immediate,
        )
    }

    /// Detach every component except system-state ones.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] if `entity` is not tracked.
    pub fn remove_all_components(
        &mut self,
        entity: Entity,
        immediate: bool,
    ) -> Result<usize, EcsError> {
        self.entities
            .remove_all_components(&mut self.components, &mut self.queries, entity, immediate)
    }

    /// Remove `entity`. Deferred unless `immediate`.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] for an untracked handle and
    /// [`EcsError::EntityRemoved`] for a second removal.
    pub fn remove_entity(&mut self, entity: Entity, immediate: bool) -> Result<(), EcsError> {
        self.entities
            .remove_entity(&mut self.components, &mut self.queries, entity, immediate)
    }

    /// Remove every alive entity (deferred).
    pub fn remove_all_entities(&mut self) {
        self.entities
            .remove_all_entities(&mut self.components, &mut self.queries);
    }

    /// Returns `true` if `entity` currently has `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.component_type::<T>()
            .zip(self.entities.get(entity))
            .is_some_and(|(ty, record)| record.has(ty))
    }

    /// Returns `true` if a `T` removed from `entity` awaits the flush.
    #[must_use]
    pub fn has_removed_component<T: Component>(&self, entity: Entity) -> bool {
        self.component_type::<T>()
            .zip(self.entities.get(entity))
            .is_some_and(|(ty, record)| record.has_removed(ty))
    }

    /// [`World::has_component`] or [`World::has_removed_component`].
    #[must_use]
    pub fn has_component_including_removed<T: Component>(&self, entity: Entity) -> bool {
        self.has_component::<T>(entity) || self.has_removed_component::<T>(entity)
    }

    /// Returns `true` if `entity` has every listed type.
    #[must_use]
    pub fn has_all_components(&self, entity: Entity, types: &[ComponentTypeId]) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|r| types.iter().all(|ty| r.has(*ty)))
    }

    /// Returns `true` if `entity` has at least one listed type.
    #[must_use]
    pub fn has_any_components(&self, entity: Entity, types: &[ComponentTypeId]) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|r| types.iter().any(|ty| r.has(*ty)))
    }

    /// Active component types of `entity`, in attachment order.
    #[must_use]
    pub fn component_types(&self, entity: Entity) -> Vec<ComponentTypeId> {
        self.entities
            .get(entity)
            .map(|r| r.component_types().collect())
            .unwrap_or_default()
    }

    /// The entity's active `T`.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        let ty = self.components.id_of::<T>()?;
        let slot = self.entities.get(entity)?.slot(ty)?;
        self.components.get::<T>(slot, entity)
    }

    /// The `T` removed from `entity` this tick, until the flush.
    #[must_use]
    pub fn get_removed_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        let ty = self.components.id_of::<T>()?;
        let slot = self.entities.get(entity)?.removed_slot(ty)?;
        self.components.get::<T>(slot, entity)
    }

    /// The active `T`, falling back to one awaiting the flush.
    #[must_use]
    pub fn get_component_including_removed<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.get_component::<T>(entity)
            .or_else(|| self.get_removed_component::<T>(entity))
    }

    /// Mutable access to the entity's active `T`.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let ty = self.components.id_of::<T>()?;
        let slot = self.entities.get(entity)?.slot(ty)?;
        self.components.get_mut::<T>(slot, entity)
    }

    /// Returns `true` if `entity` is tracked and not removed.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of alive entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// The entity store.
    #[must_use]
    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    // -- Queries --

    /// The canonical query for `descriptor`, registering its component
    /// types if needed. The `mandatory` flag is ignored here.
    pub fn query(&mut self, descriptor: &QueryDescriptor) -> QueryId {
        let shape = descriptor.resolve(&mut self.components);
        self.queries
            .get_or_create(shape, &self.components, &mut self.entities)
    }

    /// The current projection of `query`, rebuilt if stale.
    pub fn query_results(&mut self, query: QueryId) -> QueryResults {
        self.queries.prepare(query, &self.entities)
    }

    /// The query index.
    #[must_use]
    pub fn queries(&self) -> &QueryIndex {
        &self.queries
    }

    // -- Systems --

    /// Register a default-constructed `S`.
    pub fn register_system<S: System + Default>(&mut self) -> &mut Self {
        self.register_system_instance(S::default())
    }

    /// Register `system`. It runs after every system registered before it.
    ///
    /// Registering a type twice logs a warning and keeps the first instance.
    pub fn register_system_instance<S: System>(&mut self, mut system: S) -> &mut Self {
        let descriptor = system.descriptor();
        if self.systems.contains::<S>() {
            warn!(system = %descriptor.name, "system already registered");
            return self;
        }

        let mut queries = Vec::with_capacity(descriptor.queries.len());
        let mut mandatory = Vec::new();
        for query in &descriptor.queries {
            let id = self.query(query);
            queries.push(id);
            if query.mandatory {
                mandatory.push(id);
            }
        }

        system.init(self);

        debug!(
            system = %descriptor.name,
            order = self.systems.len(),
            queries = queries.len(),
            mandatory = mandatory.len(),
            "registered system"
        );
        let entry = SystemEntry::new(descriptor.name, queries, mandatory, system);
        self.systems.push(entry);
        self
    }

    /// Unregister `S`. A tick in progress skips it from now on.
    ///
    /// Returns `false` if `S` was not registered.
    pub fn unregister_system<S: System>(&mut self) -> bool {
        match self.systems.remove::<S>() {
            Some(entry) => {
                debug!(system = entry.name(), "unregistered system");
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `S` is registered.
    #[must_use]
    pub fn has_system<S: System>(&self) -> bool {
        self.systems.contains::<S>()
    }

    /// Typed access to the registered `S`.
    ///
    /// Returns `None` if `S` is not registered or is currently running.
    #[must_use]
    pub fn system<S: System>(&self) -> Option<RefMut<'_, S>> {
        self.systems.get::<S>()?.downcast::<S>()
    }

    /// Enable or disable `S`, firing its play/stop hook on a change.
    ///
    /// Returns `false` if `S` is not registered.
    pub fn set_system_enabled<S: System>(&mut self, enabled: bool) -> bool {
        match self.systems.get::<S>() {
            Some(entry) => {
                entry.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Disable every system. The world keeps ticking and flushing.
    pub fn stop_systems(&mut self) {
        self.systems.set_all_enabled(false);
    }

    /// Enable every system.
    pub fn play_systems(&mut self) {
        self.systems.set_all_enabled(true);
    }

    /// The scheduler.
    #[must_use]
    pub fn systems(&self) -> &SystemScheduler {
        &self.systems
    }

    // -- Diagnostics --

    /// Diagnostic snapshot. Has no effect on behavior.
    #[must_use]
    pub fn stats(&self) -> WorldStats {
        WorldStats {
            tick: self.tick,
            enabled: self.enabled,
            entities: EntityStats {
                tracked: self.entities.count(),
                alive: self.entities.alive_count(),
                pooled: self.entities.pooled_count(),
                pending_release: self.entities.queued_count(),
            },
            queries: self.queries.stats(),
            pools: self.components.stats(),
            systems: self.systems.stats(),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// A chaining handle to one entity.
///
/// ```rust
/// use ecs_component::Component;
/// use ecs_world::World;
///
/// #[derive(Debug, Default)]
/// struct Name(String);
/// impl Component for Name {}
///
/// let mut world = World::new();
/// let e = world
///     .spawn()
///     .insert_component(Name("player".into()))
///     .unwrap()
///     .id();
/// assert_eq!(world.get_component::<Name>(e).map(|n| n.0.as_str()), Some("player"));
/// ```
#[derive(Debug)]
pub struct EntityMut<'w> {
    world: &'w mut World,
    entity: Entity,
}

impl EntityMut<'_> {
    #[must_use]
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// See [`World::add_component`].
    ///
    /// # Errors
    ///
    /// Fails if the entity was removed.
    pub fn add_component<T: Component>(&mut self) -> Result<&mut Self, EcsError> {
        self.world.add_component::<T>(self.entity)?;
        Ok(self)
    }

    /// See [`World::add_component_with`].
    ///
    /// # Errors
    ///
    /// Fails if the entity was removed.
    pub fn add_component_with<T: Component>(
        &mut self,
        init: impl FnOnce(&mut T),
    ) -> Result<&mut Self, EcsError> {
        self.world.add_component_with::<T>(self.entity, init)?;
        Ok(self)
    }

    /// See [`World::insert_component`].
    ///
    /// # Errors
    ///
    /// Fails if the entity was removed.
    pub fn insert_component<T: Component>(&mut self, value: T) -> Result<&mut Self, EcsError> {
        self.world.insert_component::<T>(self.entity, value)?;
        Ok(self)
    }

    /// See [`World::remove_component`].
    ///
    /// # Errors
    ///
    /// Fails if the entity has been released.
    pub fn remove_component<T: Component>(
        &mut self,
        immediate: bool,
    ) -> Result<&mut Self, EcsError> {
        self.world.remove_component::<T>(self.entity, immediate)?;
        Ok(self)
    }

    /// See [`World::remove_all_components`].
    ///
    /// # Errors
    ///
    /// Fails if the entity has been released.
    pub fn remove_all_components(&mut self, immediate: bool) -> Result<&mut Self, EcsError> {
        self.world.remove_all_components(self.entity, immediate)?;
        Ok(self)
    }

    #[must_use]
    pub fn has_component<T: Component>(&self) -> bool {
        self.world.has_component::<T>(self.entity)
    }

    #[must_use]
    pub fn get_component<T: Component>(&self) -> Option<&T> {
        self.world.get_component::<T>(self.entity)
    }

    pub fn get_component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.world.get_component_mut::<T>(self.entity)
    }

    /// Remove the entity. See [`World::remove_entity`].
    ///
    /// # Errors
    ///
    /// Fails if the entity was already removed.
    pub fn remove(self, immediate: bool) -> Result<(), EcsError> {
        self.world.remove_entity(self.entity, immediate)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use ecs_component::ComponentKind;

    use super::*;
    use crate::scheduler::SystemDescriptor;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }
    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[derive(Debug, Default)]
    struct Radius(f32);
    impl Component for Radius {}

    #[derive(Debug, Default)]
    struct Colliding;
    impl Component for Colliding {}

    #[derive(Debug, Default)]
    struct Texture {
        handle: u32,
    }
    impl Component for Texture {
        const KIND: ComponentKind = ComponentKind::SystemState;
    }

    #[derive(Default)]
    struct MovementSystem;

    impl System for MovementSystem {
        fn descriptor(&self) -> SystemDescriptor {
            let moving = QueryDescriptor::new()
                .write::<Position>()
                .read::<Velocity>();
            SystemDescriptor::new("movement").query(moving)
        }

        fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
            for row in queries[0].iter() {
                if let Some((p, v)) = row.get_pair_mut::<Position, Velocity>(world) {
                    p.x += v.x;
                    p.y += v.y;
                }
            }
        }
    }

    #[derive(Default)]
    struct CollisionSystem;

    impl System for CollisionSystem {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("collision")
                .query(QueryDescriptor::new().read::<Position>().read::<Radius>())
        }

        fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
            let view: &World = world;
            let bodies: Vec<(Entity, Position, f32)> = queries[0]
                .iter()
                .filter_map(|row| {
                    let p = row.get::<Position>(view)?.clone();
                    let r = row.get::<Radius>(view)?.0;
                    Some((row.entity(), p, r))
                })
                .collect();
            for (i, (a, pa, ra)) in bodies.iter().enumerate() {
                for (b, pb, rb) in &bodies[i + 1..] {
                    let (dx, dy) = (pa.x - pb.x, pa.y - pb.y);
                    if (dx * dx + dy * dy).sqrt() < ra + rb {
                        world.add_component::<Colliding>(*a).unwrap();
                        world.add_component::<Colliding>(*b).unwrap();
                    }
                }
            }
        }
    }

    #[derive(Default)]
    struct CollisionObserver {
        seen: usize,
    }

    impl System for CollisionObserver {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("observer").query(QueryDescriptor::new().read::<Colliding>())
        }

        fn run(&mut self, _world: &mut World, queries: &[QueryResults]) {
            self.seen = queries[0].len();
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen_x: Vec<f32>,
        runs: u32,
    }

    impl System for Recorder {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("recorder")
                .query(QueryDescriptor::new().read::<Position>().mandatory())
        }

        fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
            self.runs += 1;
            for row in queries[0].iter() {
                if let Some(p) = row.get::<Position>(world) {
                    self.seen_x.push(p.x);
                }
            }
        }
    }

    #[derive(Default)]
    struct Tagged {
        value: u32,
    }

    impl System for Tagged {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("tagged")
        }

        fn run(&mut self, _world: &mut World, _queries: &[QueryResults]) {}
    }

    /// Removes every `Position` it sees (deferred), then reads it back
    /// through the same row.
    #[derive(Default)]
    struct Reaper {
        read_back: Vec<f32>,
    }

    impl System for Reaper {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("reaper").query(QueryDescriptor::new().read::<Position>())
        }

        fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
            for row in queries[0].iter() {
                world
                    .remove_component::<Position>(row.entity(), false)
                    .unwrap();
                if let Some(p) = row.get::<Position>(world) {
                    self.read_back.push(p.x);
                }
            }
        }
    }

    /// Looks at one entity's `Position` after the reaper has run.
    struct Mourner {
        watched: Entity,
        attached: bool,
        removed: Option<Position>,
        including_removed: Option<Position>,
    }

    impl System for Mourner {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("mourner")
        }

        fn run(&mut self, world: &mut World, _queries: &[QueryResults]) {
            self.attached = world.has_component::<Position>(self.watched);
            self.removed = world
                .get_removed_component::<Position>(self.watched)
                .cloned();
            self.including_removed = world
                .get_component_including_removed::<Position>(self.watched)
                .cloned();
        }
    }

    fn spawn_at(world: &mut World, x: f32, y: f32, r: f32) -> Entity {
        world
            .spawn()
            .insert_component(Position { x, y })
            .unwrap()
            .insert_component(Radius(r))
            .unwrap()
            .id()
    }

    #[test]
    fn test_deferred_removal_visibility() {
        let mut world = World::new();
        let e = world.create_entity();
        world
            .insert_component(e, Position { x: 1.0, y: 2.0 })
            .unwrap();

        assert!(world.remove_component::<Position>(e, false).unwrap());
        assert!(!world.has_component::<Position>(e));
        assert!(world.has_component_including_removed::<Position>(e));
        assert_eq!(
            world.get_component_including_removed::<Position>(e),
            Some(&Position { x: 1.0, y: 2.0 })
        );
        assert!(world.get_component::<Position>(e).is_none());

        world.run();
        assert!(world.get_removed_component::<Position>(e).is_none());
        assert_eq!(world.stats().pools[0].used, 0);

        // The released instance comes back reset.
        let other = world.create_entity();
        world.add_component::<Position>(other).unwrap();
        assert_eq!(
            world.get_component::<Position>(other),
            Some(&Position::default())
        );
        assert_eq!(world.stats().pools[0].size, 1);
    }

    #[test]
    fn test_later_system_sees_component_removed_this_tick() {
        let mut world = World::new();
        let e = world.create_entity();
        world
            .insert_component(e, Position { x: 3.0, y: 4.0 })
            .unwrap();
        world
            .register_system::<Reaper>()
            .register_system_instance(Mourner {
                watched: e,
                attached: true,
                removed: None,
                including_removed: None,
            });

        world.run();
        {
            let mourner = world.system::<Mourner>().unwrap();
            assert!(!mourner.attached);
            assert_eq!(mourner.removed, Some(Position { x: 3.0, y: 4.0 }));
            assert_eq!(mourner.including_removed, Some(Position { x: 3.0, y: 4.0 }));
        }
        assert!(world.get_removed_component::<Position>(e).is_none());

        // Nothing left to remove, so the next tick sees nothing either.
        world.run();
        assert_eq!(world.system::<Mourner>().unwrap().removed, None);
    }

    #[test]
    fn test_row_reads_deferred_removed_component_until_flush() {
        let mut world = World::new();
        world.register_system::<Reaper>();
        let e = world.create_entity();
        world
            .insert_component(e, Position { x: 3.0, y: 0.0 })
            .unwrap();

        world.run();
        assert_eq!(world.system::<Reaper>().unwrap().read_back, vec![3.0]);
        assert!(!world.has_component_including_removed::<Position>(e));
        assert_eq!(world.stats().pools[0].used, 0);
    }

    #[test]
    fn test_readd_after_deferred_remove_replaces_instance() {
        let mut world = World::new();
        let e = world.create_entity();
        world
            .insert_component(e, Position { x: 7.0, y: 0.0 })
            .unwrap();
        world.remove_component::<Position>(e, false).unwrap();
        world
            .insert_component(e, Position { x: 9.0, y: 0.0 })
            .unwrap();

        assert!(world.has_component::<Position>(e));
        assert!(!world.has_removed_component::<Position>(e));
        assert!(world.get_removed_component::<Position>(e).is_none());
        assert_eq!(world.get_component::<Position>(e).map(|p| p.x), Some(9.0));
        assert_eq!(world.stats().pools[0].used, 1);
    }

    #[test]
    fn test_add_and_remove_are_idempotent() {
        let mut world = World::new();
        let e = world.create_entity();
        world
            .insert_component(e, Position { x: 5.0, y: 0.0 })
            .unwrap();
        assert!(!world.add_component::<Position>(e).unwrap());
        assert_eq!(world.get_component::<Position>(e).map(|p| p.x), Some(5.0));

        assert!(world.remove_component::<Position>(e, false).unwrap());
        assert!(!world.remove_component::<Position>(e, false).unwrap());
        assert!(!world.remove_component::<Velocity>(e, false).unwrap());
        assert_eq!(world.process_deferred_removal().components_released, 1);
    }

    #[test]
    fn test_not_query_drops_entity_on_add() {
        let mut world = World::new();
        let e = world.create_entity();
        world.add_component::<Position>(e).unwrap();
        let shape = QueryDescriptor::new().read::<Position>().not::<Velocity>();
        let q = world.query(&shape);
        assert!(world.queries().contains(q, e));

        world.add_component::<Velocity>(e).unwrap();
        assert!(!world.queries().contains(q, e));
        assert!(world.query_results(q).is_empty());
    }

    #[test]
    fn test_systems_run_in_registration_order() {
        let mut world = World::new();
        world
            .register_system::<MovementSystem>()
            .register_system::<Recorder>();
        let e = world.create_entity();
        world.add_component::<Position>(e).unwrap();
        world
            .insert_component(e, Velocity { x: 2.0, y: 0.0 })
            .unwrap();

        world.run();
        world.run();
        let recorder = world.system::<Recorder>().unwrap();
        assert_eq!(recorder.seen_x, vec![2.0, 4.0]);
    }

    #[test]
    fn test_collision_marker_visible_to_later_system() {
        let mut world = World::new();
        world
            .register_system::<MovementSystem>()
            .register_system::<CollisionSystem>()
            .register_system::<CollisionObserver>();
        let a = spawn_at(&mut world, 0.0, 0.0, 2.0);
        let b = spawn_at(&mut world, 3.0, 0.0, 2.0);
        let far = spawn_at(&mut world, 50.0, 0.0, 1.0);

        world.run();
        assert!(world.has_component::<Colliding>(a));
        assert!(world.has_component::<Colliding>(b));
        assert!(!world.has_component::<Colliding>(far));
        assert_eq!(world.system::<CollisionObserver>().unwrap().seen, 2);
    }

    #[test]
    fn test_mandatory_query_gates_system() {
        let mut world = World::new();
        world.register_system::<Recorder>();
        world.run();
        assert_eq!(world.system::<Recorder>().unwrap().runs, 0);

        let e = world.create_entity();
        world.add_component::<Position>(e).unwrap();
        world.run();
        assert_eq!(world.system::<Recorder>().unwrap().runs, 1);
        assert_eq!(world.systems().get::<Recorder>().unwrap().runs(), 1);
    }

    #[test]
    fn test_duplicate_registration_keeps_first_instance() {
        let mut world = World::new();
        world.register_system_instance(Tagged { value: 5 });
        world.register_system_instance(Tagged { value: 9 });
        assert_eq!(world.systems().len(), 1);
        assert_eq!(world.system::<Tagged>().unwrap().value, 5);
    }

    #[test]
    fn test_stopped_world_skips_tick_and_flush() {
        let mut world = World::new();
        world.register_system::<Recorder>();
        let e = world.create_entity();
        world.add_component::<Position>(e).unwrap();
        world.remove_entity(e, false).unwrap();

        world.stop();
        world.run();
        assert_eq!(world.tick(), 0);
        assert_eq!(world.entities().queued_count(), 1);

        world.play();
        world.run();
        assert_eq!(world.tick(), 1);
        assert!(world.entities().get(e).is_none());
    }

    #[test]
    fn test_stop_systems_keeps_flushing() {
        let mut world = World::new();
        world.register_system::<Recorder>();
        let e = world.create_entity();
        world.add_component::<Position>(e).unwrap();
        world.stop_systems();
        world.remove_component::<Position>(e, false).unwrap();
        world.run();
        assert_eq!(world.system::<Recorder>().unwrap().runs, 0);
        assert!(!world.has_removed_component::<Position>(e));

        world.play_systems();
        world.add_component::<Position>(e).unwrap();
        world.run();
        assert_eq!(world.system::<Recorder>().unwrap().runs, 1);
    }

    #[test]
    fn test_set_system_enabled() {
        let mut world = World::new();
        world.register_system::<Recorder>();
        let e = world.create_entity();
        world.add_component::<Position>(e).unwrap();
        assert!(world.set_system_enabled::<Recorder>(false));
        world.run();
        assert_eq!(world.system::<Recorder>().unwrap().runs, 0);
        assert!(!world.set_system_enabled::<Tagged>(false));
    }

    struct Unregisterer;

    impl System for Unregisterer {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("unregisterer")
        }

        fn run(&mut self, world: &mut World, _queries: &[QueryResults]) {
            world.unregister_system::<Counted>();
            world.register_system_instance(Tagged::default());
        }
    }

    struct Counted {
        runs: Rc<Cell<u32>>,
    }

    impl System for Counted {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("counted")
        }

        fn run(&mut self, _world: &mut World, _queries: &[QueryResults]) {
            self.runs.set(self.runs.get() + 1);
        }
    }

    #[test]
    fn test_mid_tick_registry_changes() {
        let runs = Rc::new(Cell::new(0));
        let mut world = World::new();
        world
            .register_system_instance(Unregisterer)
            .register_system_instance(Counted { runs: Rc::clone(&runs) });

        world.run();
        assert_eq!(runs.get(), 0);
        assert!(!world.has_system::<Counted>());
        // Registered mid-tick, so it has not run yet.
        assert_eq!(world.systems().get::<Tagged>().unwrap().runs(), 0);

        world.run();
        assert_eq!(world.systems().get::<Tagged>().unwrap().runs(), 1);
    }

    #[test]
    fn test_remove_entity_twice_is_error() {
        let mut world = World::new();
        let e = world.create_entity();
        world.remove_entity(e, false).unwrap();
        assert_eq!(
            world.remove_entity(e, false),
            Err(EcsError::EntityRemoved(e))
        );
        world.run();
        assert_eq!(
            world.remove_entity(e, false),
            Err(EcsError::EntityNotFound(e))
        );
        assert!(world.entity_mut(e).is_err());
    }

    #[test]
    fn test_system_state_survives_entity_removal() {
        let mut world = World::new();
        let e = world
            .spawn()
            .add_component::<Position>()
            .unwrap()
            .insert_component(Texture { handle: 42 })
            .unwrap()
            .id();

        world.remove_entity(e, false).unwrap();
        world.run();
        assert!(!world.is_alive(e));
        assert_eq!(
            world.get_component::<Texture>(e).map(|t| t.handle),
            Some(42)
        );
        assert!(!world.has_component::<Position>(e));
        assert_eq!(
            world.add_component::<Velocity>(e),
            Err(EcsError::EntityRemoved(e))
        );

        world.remove_component::<Texture>(e, false).unwrap();
        world.run();
        assert!(world.entities().get(e).is_none());
    }

    #[test]
    fn test_has_all_and_any() {
        let mut world = World::new();
        let pos = world.register_component::<Position>();
        let vel = world.register_component::<Velocity>();
        let e = world.spawn().add_component::<Position>().unwrap().id();
        assert!(world.has_all_components(e, &[pos]));
        assert!(!world.has_all_components(e, &[pos, vel]));
        assert!(world.has_any_components(e, &[pos, vel]));
        assert_eq!(world.component_types(e), vec![pos]);
    }

    #[test]
    fn test_remove_all_entities() {
        let mut world = World::new();
        for _ in 0..3 {
            world.spawn().add_component::<Position>().unwrap();
        }
        assert_eq!(world.entity_count(), 3);
        world.remove_all_entities();
        assert_eq!(world.entity_count(), 0);
        world.run();
        let stats = world.stats();
        assert_eq!(stats.entities.tracked, 0);
        assert_eq!(stats.entities.pooled, 3);
    }

    #[test]
    fn test_stats_snapshot() {
        let mut world = World::with_config(WorldConfig::new().with_component_pool_capacity(4));
        world.register_system::<MovementSystem>();
        let e = world.create_entity();
        world.add_component::<Position>(e).unwrap();
        world.add_component::<Velocity>(e).unwrap();
        world.run();

        let stats = world.stats();
        assert_eq!(stats.tick, 1);
        assert_eq!(stats.entities.alive, 1);
        assert_eq!(stats.queries.len(), 1);
        assert_eq!(stats.queries[0].members, 1);
        assert_eq!(stats.pools[0].size, 4);
        assert_eq!(stats.pools[0].used, 1);
        assert_eq!(stats.systems[0].name, "movement");
        assert_eq!(stats.systems[0].runs, 1);
    }
}
