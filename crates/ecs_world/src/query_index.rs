//! Incrementally maintained queries.
//!
//! The [`QueryIndex`] keeps one [`Query`] per canonical shape. Membership is
//! updated eagerly: the entity store calls [`QueryIndex::notify`] on every
//! component add or remove, and only queries whose shape mentions the
//! changed type re-test the entity. The data handed to systems (a
//! [`QueryResults`] projection) is rebuilt lazily by
//! [`QueryIndex::prepare`], and only when membership or attachments changed
//! since the last build.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use ecs_component::{Component, ComponentRegistry, ComponentSlot, ComponentTypeId, Entity, Operator};
use serde::Serialize;
use tracing::debug;

use crate::entity_store::{EntityRecord, EntityStore};
use crate::world::World;

/// A resolved query shape: `(operator, component type)` pairs.
pub type Shape = Vec<(Operator, ComponentTypeId)>;

/// Handle of a canonical query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub u32);

impl QueryId {
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Membership counters for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    /// Canonical key, e.g. `read(Position)-not(Velocity)`.
    pub key: String,
    /// Number of terms in the shape.
    pub terms: usize,
    /// Number of matching entities.
    pub members: usize,
}

/// Flattened per-entity data for one query.
///
/// `slots` holds `columns.len()` entries per entity, one per positive term.
#[derive(Debug, Default)]
struct Projection {
    columns: Vec<ComponentTypeId>,
    entities: Vec<Entity>,
    slots: Vec<ComponentSlot>,
}

impl Projection {
    fn rebuild(
        &mut self,
        columns: &[ComponentTypeId],
        members: &BTreeSet<Entity>,
        entities: &EntityStore,
    ) {
        self.columns.clear();
        self.columns.extend_from_slice(columns);
        self.entities.clear();
        self.slots.clear();

        for &entity in members {
            let Some(record) = entities.get(entity) else {
                continue;
            };
            let start = self.slots.len();
            for &ty in columns {
                match record.slot(ty) {
                    Some(slot) => self.slots.push(slot),
                    None => break,
                }
            }
            if self.slots.len() - start == columns.len() {
                self.entities.push(entity);
            } else {
                self.slots.truncate(start);
            }
        }
    }
}

/// One canonical query and its cached projection.
#[derive(Debug)]
struct Query {
    id: QueryId,
    key: String,
    /// Canonical (sorted) shape.
    shape: Shape,
    /// Component types of the positive terms, in canonical order.
    columns: Vec<ComponentTypeId>,
    members: BTreeSet<Entity>,
    dirty: bool,
    projection: Rc<Projection>,
}

impl Query {
    fn matches(&self, record: &EntityRecord) -> bool {
        self.shape
            .iter()
            .all(|(op, ty)| op.accepts(record.has(*ty)))
    }

    /// Re-test `record` and fix up membership on both sides.
    fn refresh(&mut self, record: &mut EntityRecord) {
        let matches = self.matches(record);
        let member = self.members.contains(&record.id());
        if matches && !member {
            self.members.insert(record.id());
            record.queries.push(self.id);
        } else if !matches && member {
            self.members.remove(&record.id());
            record.queries.retain(|q| *q != self.id);
        }
        self.dirty = true;
    }
}

/// Registry of canonical queries.
#[derive(Debug, Default)]
pub struct QueryIndex {
    queries: Vec<Query>,
    by_shape: HashMap<Shape, QueryId>,
    /// Queries to re-test when a component of the keyed type changes.
    by_type: HashMap<ComponentTypeId, Vec<QueryId>>,
    /// Queries without a positive term; they can match component-less entities.
    unconstrained: Vec<QueryId>,
}

impl QueryIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The canonical query for `shape`, created on first request with its
    /// membership computed against every tracked entity.
    ///
    /// Shapes are compared as multisets: term order does not matter.
    pub fn get_or_create(
        &mut self,
        mut shape: Shape,
        registry: &ComponentRegistry,
        entities: &mut EntityStore,
    ) -> QueryId {
        shape.sort_unstable();
        if let Some(&id) = self.by_shape.get(&shape) {
            return id;
        }

        let id = QueryId(self.queries.len() as u32);
        let key = shape
            .iter()
            .map(|(op, ty)| format!("{op}({})", registry.name(*ty)))
            .collect::<Vec<_>>()
            .join("-");
        let columns = shape
            .iter()
            .filter(|(op, _)| op.requires_presence())
            .map(|(_, ty)| *ty)
            .collect::<Vec<_>>();

        let mut query = Query {
            id,
            key,
            shape: shape.clone(),
            columns,
            members: BTreeSet::new(),
            dirty: true,
            projection: Rc::new(Projection::default()),
        };
        for record in entities.records_mut() {
            if query.matches(record) {
                query.members.insert(record.id());
                record.queries.push(id);
            }
        }

        for (_, ty) in &shape {
            let ids = self.by_type.entry(*ty).or_default();
            if ids.last() != Some(&id) {
                ids.push(id);
            }
        }
        if query.columns.is_empty() {
            self.unconstrained.push(id);
        }

        debug!(
            query = %query.key,
            id = id.0,
            members = query.members.len(),
            "created query"
        );
        self.queries.push(query);
        self.by_shape.insert(shape, id);
        id
    }

    /// Re-evaluate `record` against every query mentioning `ty`.
    pub(crate) fn notify(&mut self, record: &mut EntityRecord, ty: ComponentTypeId) {
        let Some(ids) = self.by_type.get(&ty) else {
            return;
        };
        for id in ids {
            self.queries[id.index()].refresh(record);
        }
    }

    /// A new entity has no components; only queries without positive terms
    /// can match it.
    pub(crate) fn on_entity_created(&mut self, record: &mut EntityRecord) {
        for id in &self.unconstrained {
            self.queries[id.index()].refresh(record);
        }
    }

    /// Drop a released entity from every query it belongs to.
    pub(crate) fn on_entity_released(&mut self, record: &mut EntityRecord) {
        let entity = record.id();
        for id in record.queries.drain(..) {
            let query = &mut self.queries[id.index()];
            query.members.remove(&entity);
            query.dirty = true;
        }
    }

    /// Rebuild the projection of `id` if it is stale and hand it out.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this index.
    pub fn prepare(&mut self, id: QueryId, entities: &EntityStore) -> QueryResults {
        let query = &mut self.queries[id.index()];
        if query.dirty {
            // Reuse the buffers unless a caller still holds the last results.
            if Rc::get_mut(&mut query.projection).is_none() {
                query.projection = Rc::new(Projection::default());
            }
            if let Some(projection) = Rc::get_mut(&mut query.projection) {
                projection.rebuild(&query.columns, &query.members, entities);
            }
            query.dirty = false;
        }
        QueryResults {
            projection: Rc::clone(&query.projection),
        }
    }

    /// Returns `true` if `entity` currently matches query `id`.
    #[must_use]
    pub fn contains(&self, id: QueryId, entity: Entity) -> bool {
        self.queries
            .get(id.index())
            .is_some_and(|q| q.members.contains(&entity))
    }

    /// Number of entities matching query `id`.
    #[must_use]
    pub fn len(&self, id: QueryId) -> usize {
        self.queries.get(id.index()).map_or(0, |q| q.members.len())
    }

    /// Returns `true` if no entity matches query `id`.
    #[must_use]
    pub fn is_empty(&self, id: QueryId) -> bool {
        self.len(id) == 0
    }

    /// Matching entities of query `id`, in ascending id order.
    pub fn members(&self, id: QueryId) -> impl Iterator<Item = Entity> + '_ {
        self.queries
            .get(id.index())
            .into_iter()
            .flat_map(|q| q.members.iter().copied())
    }

    /// Returns `true` if the projection of `id` will be rebuilt on the next
    /// [`QueryIndex::prepare`].
    #[must_use]
    pub fn is_dirty(&self, id: QueryId) -> bool {
        self.queries.get(id.index()).is_some_and(|q| q.dirty)
    }

    /// Canonical key of query `id`.
    #[must_use]
    pub fn key(&self, id: QueryId) -> Option<&str> {
        self.queries.get(id.index()).map(|q| q.key.as_str())
    }

    /// Number of canonical queries.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    /// Membership counters for every query, in creation order.
    #[must_use]
    pub fn stats(&self) -> Vec<QueryStats> {
        self.queries
            .iter()
            .map(|q| QueryStats {
                key: q.key.clone(),
                terms: q.shape.len(),
                members: q.members.len(),
            })
            .collect()
    }
}

/// The projection of one query, as handed to a system.
///
/// Cloning is cheap. Rows follow ascending entity id.
#[derive(Debug, Clone)]
pub struct QueryResults {
    projection: Rc<Projection>,
}

impl QueryResults {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.projection.entities.len()
    }

    /// Returns `true` if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projection.entities.is_empty()
    }

    /// The entity of every row.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.projection.entities
    }

    /// Row `index`, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Row<'_>> {
        let p = &*self.projection;
        let entity = *p.entities.get(index)?;
        let width = p.columns.len();
        Some(Row {
            entity,
            columns: &p.columns,
            slots: &p.slots[index * width..(index + 1) * width],
        })
    }

    /// The first row, handy for singleton queries.
    #[must_use]
    pub fn first(&self) -> Option<Row<'_>> {
        self.get(0)
    }

    /// Iterate over rows.
    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

/// One entity of a projection together with its pre-resolved component slots.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    entity: Entity,
    columns: &'a [ComponentTypeId],
    slots: &'a [ComponentSlot],
}

impl Row<'_> {
    /// The entity this row belongs to.
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    fn slot_of<T: Component>(&self, registry: &ComponentRegistry) -> Option<ComponentSlot> {
        let ty = registry.id_of::<T>()?;
        self.columns
            .iter()
            .position(|c| *c == ty)
            .map(|i| self.slots[i])
    }

    /// The `T` captured by this row.
    ///
    /// A component removed (deferred) after the projection was built stays
    /// readable until the end-of-tick flush; once the instance has been
    /// released this returns `None`.
    #[must_use]
    pub fn get<'w, T: Component>(&self, world: &'w World) -> Option<&'w T> {
        let registry = world.components();
        let slot = self.slot_of::<T>(registry)?;
        registry.get::<T>(slot, self.entity)
    }

    /// Mutable access to the `T` captured by this row.
    pub fn get_mut<'w, T: Component>(&self, world: &'w mut World) -> Option<&'w mut T> {
        let slot = self.slot_of::<T>(world.components())?;
        world.components_mut().get_mut::<T>(slot, self.entity)
    }

    /// Mutable access to two different captured components at once.
    pub fn get_pair_mut<'w, A: Component, B: Component>(
        &self,
        world: &'w mut World,
    ) -> Option<(&'w mut A, &'w mut B)> {
        let a = self.slot_of::<A>(world.components())?;
        let b = self.slot_of::<B>(world.components())?;
        world
            .components_mut()
            .get_pair_mut::<A, B>((a, self.entity), (b, self.entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Position;
    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, Default)]
    struct Velocity;
    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    struct Fixture {
        registry: ComponentRegistry,
        queries: QueryIndex,
        store: EntityStore,
        pos: ComponentTypeId,
        vel: ComponentTypeId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = ComponentRegistry::new();
            let pos = registry.register::<Position>();
            let vel = registry.register::<Velocity>();
            Self {
                registry,
                queries: QueryIndex::new(),
                store: EntityStore::new(),
                pos,
                vel,
            }
        }

        fn query(&mut self, shape: Shape) -> QueryId {
            self.queries
                .get_or_create(shape, &self.registry, &mut self.store)
        }

        fn spawn_with<T: Component>(&mut self) -> Entity {
            let e = self.store.create_entity(&mut self.queries);
            self.store
                .add_component::<T>(&mut self.registry, &mut self.queries, e, |_| {})
                .unwrap();
            e
        }
    }

    #[test]
    fn test_shapes_are_canonicalized() {
        let mut fx = Fixture::new();
        let (pos, vel) = (fx.pos, fx.vel);
        let a = fx.query(vec![(Operator::Read, pos), (Operator::Not, vel)]);
        let b = fx.query(vec![(Operator::Not, vel), (Operator::Read, pos)]);
        let c = fx.query(vec![(Operator::Write, pos), (Operator::Not, vel)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(fx.queries.query_count(), 2);
        assert_eq!(fx.queries.key(a), Some("read(Position)-not(Velocity)"));
    }

    #[test]
    fn test_initial_membership_covers_existing_entities() {
        let mut fx = Fixture::new();
        let e = fx.spawn_with::<Position>();
        let pos = fx.pos;
        let q = fx.query(vec![(Operator::Read, pos)]);
        assert!(fx.queries.contains(q, e));
        assert_eq!(fx.store.get(e).unwrap().queries(), &[q]);
    }

    #[test]
    fn test_projection_is_rebuilt_lazily() {
        let mut fx = Fixture::new();
        let pos = fx.pos;
        let q = fx.query(vec![(Operator::Read, pos)]);
        assert!(fx.queries.is_dirty(q));
        let results = fx.queries.prepare(q, &fx.store);
        assert!(results.is_empty());
        assert!(!fx.queries.is_dirty(q));
        drop(results);

        let e = fx.spawn_with::<Position>();
        assert!(fx.queries.is_dirty(q));
        let results = fx.queries.prepare(q, &fx.store);
        assert_eq!(results.entities(), &[e]);
        assert_eq!(results.first().map(|r| r.entity()), Some(e));
    }

    #[test]
    fn test_held_results_are_not_mutated_by_rebuild() {
        let mut fx = Fixture::new();
        let pos = fx.pos;
        let q = fx.query(vec![(Operator::Read, pos)]);
        let first = fx.spawn_with::<Position>();
        let held = fx.queries.prepare(q, &fx.store);
        let second = fx.spawn_with::<Position>();
        let fresh = fx.queries.prepare(q, &fx.store);
        assert_eq!(held.entities(), &[first]);
        assert_eq!(fresh.entities(), &[first, second]);
    }

    #[test]
    fn test_not_only_query_tracks_empty_entities() {
        let mut fx = Fixture::new();
        let vel = fx.vel;
        let q = fx.query(vec![(Operator::Not, vel)]);
        let e = fx.store.create_entity(&mut fx.queries);
        assert!(fx.queries.contains(q, e));
        fx.store
            .remove_entity(&mut fx.registry, &mut fx.queries, e, true)
            .unwrap();
        assert!(!fx.queries.contains(q, e));
        assert_eq!(fx.queries.len(q), 0);
    }

    #[test]
    fn test_released_entity_leaves_every_query() {
        let mut fx = Fixture::new();
        let (pos, vel) = (fx.pos, fx.vel);
        let with_pos = fx.query(vec![(Operator::Read, pos)]);
        let without_vel = fx.query(vec![(Operator::Not, vel)]);
        let e = fx.spawn_with::<Position>();
        assert!(fx.queries.contains(with_pos, e));
        assert!(fx.queries.contains(without_vel, e));

        fx.store
            .remove_entity(&mut fx.registry, &mut fx.queries, e, false)
            .unwrap();
        assert!(!fx.queries.contains(with_pos, e));
        // Still tracked until the flush.
        assert!(fx.queries.contains(without_vel, e));
        drop(fx.queries.prepare(without_vel, &fx.store));

        fx.store
            .process_deferred_removal(&mut fx.registry, &mut fx.queries);
        assert!(!fx.queries.contains(without_vel, e));
        assert!(fx.queries.is_dirty(without_vel));
        assert_eq!(fx.queries.len(without_vel), 0);
    }

    #[test]
    fn test_unrelated_change_does_not_dirty_query() {
        let mut fx = Fixture::new();
        let pos = fx.pos;
        let q = fx.query(vec![(Operator::Read, pos)]);
        drop(fx.queries.prepare(q, &fx.store));
        fx.spawn_with::<Velocity>();
        assert!(!fx.queries.is_dirty(q));
    }

    #[test]
    fn test_stats() {
        let mut fx = Fixture::new();
        let pos = fx.pos;
        fx.spawn_with::<Position>();
        fx.query(vec![(Operator::Read, pos)]);
        let stats = fx.queries.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].key, "read(Position)");
        assert_eq!(stats[0].members, 1);
        assert_eq!(stats[0].terms, 1);
    }
}
