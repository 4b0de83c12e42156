//! System scheduler: registration order, enable flags, and dispatch state.
//!
//! Systems run strictly in registration order, one at a time. The scheduler
//! only keeps the ordered list of [`SystemEntry`]s; resolving descriptors
//! into queries and dispatching a tick is done by the
//! [`World`](crate::World), which owns the query index the entries point
//! into.
//!
//! Entries are reference counted so a tick can iterate a snapshot of the
//! list while systems register or unregister other systems.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use ecs_component::QueryDescriptor;
use serde::Serialize;

use crate::query_index::{QueryId, QueryResults};
use crate::world::World;

/// A per-tick update function bound to one or more queries.
///
/// # Examples
///
/// ```rust
/// use ecs_component::{Component, QueryDescriptor};
/// use ecs_world::{QueryResults, System, SystemDescriptor, World};
///
/// #[derive(Debug, Default)]
/// struct Health(u32);
/// impl Component for Health {}
///
/// #[derive(Default)]
/// struct Regenerate;
///
/// impl System for Regenerate {
///     fn descriptor(&self) -> SystemDescriptor {
///         SystemDescriptor::new("regenerate").query(QueryDescriptor::new().write::<Health>())
///     }
///
///     fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
///         for row in queries[0].iter() {
///             if let Some(health) = row.get_mut::<Health>(world) {
///                 health.0 += 1;
///             }
///         }
///     }
/// }
///
/// let mut world = World::new();
/// world.register_system::<Regenerate>();
/// let e = world.create_entity();
/// world.add_component::<Health>(e).unwrap();
/// world.run();
/// assert_eq!(world.get_component::<Health>(e).map(|h| h.0), Some(1));
/// ```
pub trait System: 'static {
    /// Name and query shapes. Read once, at registration.
    fn descriptor(&self) -> SystemDescriptor;

    /// Called once, after the queries are bound and before the first run.
    fn init(&mut self, _world: &mut World) {}

    /// One tick of work. `queries` holds one projection per declared
    /// query, in declaration order.
    fn run(&mut self, world: &mut World, queries: &[QueryResults]);

    /// Called when the system is resumed.
    fn on_play(&mut self) {}

    /// Called when the system is paused.
    fn on_stop(&mut self) {}
}

/// Declares a system's name and the query shapes it consumes.
#[derive(Debug, Clone)]
pub struct SystemDescriptor {
    /// Human-readable name, used in stats and logs.
    pub name: String,
    /// Query shapes in declaration order.
    pub queries: Vec<QueryDescriptor>,
}

impl SystemDescriptor {
    /// A descriptor with no queries.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queries: Vec::new(),
        }
    }

    /// Append a query shape.
    #[must_use]
    pub fn query(mut self, query: QueryDescriptor) -> Self {
        self.queries.push(query);
        self
    }
}

/// Type-erased access to a registered system instance.
pub(crate) trait ErasedSystem {
    /// Run the system. Returns `false` if the instance is already borrowed.
    fn run(&self, world: &mut World, queries: &[QueryResults]) -> bool;
    fn set_playing(&self, playing: bool);
    fn as_any(&self) -> &dyn Any;
}

/// Interior-mutable holder of one system instance.
pub(crate) struct SystemCell<S> {
    cell: RefCell<S>,
}

impl<S: System> SystemCell<S> {
    pub(crate) fn new(system: S) -> Self {
        Self {
            cell: RefCell::new(system),
        }
    }

    pub(crate) fn borrow_mut(&self) -> Option<RefMut<'_, S>> {
        self.cell.try_borrow_mut().ok()
    }
}

impl<S: System> ErasedSystem for SystemCell<S> {
    fn run(&self, world: &mut World, queries: &[QueryResults]) -> bool {
        match self.cell.try_borrow_mut() {
            Ok(mut system) => {
                system.run(world, queries);
                true
            }
            Err(_) => false,
        }
    }

    fn set_playing(&self, playing: bool) {
        if let Ok(mut system) = self.cell.try_borrow_mut() {
            if playing {
                system.on_play();
            } else {
                system.on_stop();
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One registered system and its dispatch state.
pub struct SystemEntry {
    name: String,
    rust_type: TypeId,
    /// Bound queries, in declaration order.
    queries: Vec<QueryId>,
    /// Queries that must be non-empty for the system to run.
    mandatory: Vec<QueryId>,
    enabled: Cell<bool>,
    /// Cleared on unregistration so an in-flight snapshot skips the entry.
    registered: Cell<bool>,
    runs: Cell<u64>,
    last_run: Cell<Duration>,
    system: Box<dyn ErasedSystem>,
}

impl SystemEntry {
    pub(crate) fn new<S: System>(
        name: String,
        queries: Vec<QueryId>,
        mandatory: Vec<QueryId>,
        system: S,
    ) -> Self {
        Self {
            name,
            rust_type: TypeId::of::<S>(),
            queries,
            mandatory,
            enabled: Cell::new(true),
            registered: Cell::new(true),
            runs: Cell::new(0),
            last_run: Cell::new(Duration::ZERO),
            system: Box::new(SystemCell::new(system)),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound queries, in declaration order.
    #[must_use]
    pub fn queries(&self) -> &[QueryId] {
        &self.queries
    }

    #[must_use]
    pub fn mandatory(&self) -> &[QueryId] {
        &self.mandatory
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.get()
    }

    /// Number of completed runs.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs.get()
    }

    /// Wall time of the most recent run.
    #[must_use]
    pub fn last_run(&self) -> Duration {
        self.last_run.get()
    }

    /// Toggle the enabled flag, firing the matching hook on a change.
    pub(crate) fn set_enabled(&self, enabled: bool) {
        if self.enabled.replace(enabled) != enabled {
            self.system.set_playing(enabled);
        }
    }

    pub(crate) fn run(&self, world: &mut World, queries: &[QueryResults]) -> bool {
        self.system.run(world, queries)
    }

    pub(crate) fn record_run(&self, elapsed: Duration) {
        self.runs.set(self.runs.get() + 1);
        self.last_run.set(elapsed);
    }

    pub(crate) fn downcast<S: System>(&self) -> Option<RefMut<'_, S>> {
        self.system
            .as_any()
            .downcast_ref::<SystemCell<S>>()?
            .borrow_mut()
    }

    fn stats(&self) -> SystemStats {
        SystemStats {
            name: self.name.clone(),
            enabled: self.enabled.get(),
            queries: self.queries.len(),
            runs: self.runs.get(),
            last_run_us: self.last_run.get().as_micros() as u64,
        }
    }
}

impl fmt::Debug for SystemEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemEntry")
            .field("name", &self.name)
            .field("queries", &self.queries)
            .field("mandatory", &self.mandatory)
            .field("enabled", &self.enabled.get())
            .field("runs", &self.runs.get())
            .finish_non_exhaustive()
    }
}

/// Per-system counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub name: String,
    pub enabled: bool,
    /// Number of bound queries.
    pub queries: usize,
    pub runs: u64,
    /// Wall time of the most recent run, in microseconds.
    pub last_run_us: u64,
}

/// Ordered list of registered systems.
#[derive(Debug, Default)]
pub struct SystemScheduler {
    systems: Vec<Rc<SystemEntry>>,
}

impl SystemScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a system of type `S` is registered.
    #[must_use]
    pub fn contains<S: System>(&self) -> bool {
        self.position(TypeId::of::<S>()).is_some()
    }

    /// Append `entry`; it runs after every system registered before it.
    pub(crate) fn push(&mut self, entry: SystemEntry) {
        self.systems.push(Rc::new(entry));
    }

    /// Remove the system of type `S`, flagging the entry so a tick already
    /// iterating a snapshot skips it.
    pub(crate) fn remove<S: System>(&mut self) -> Option<Rc<SystemEntry>> {
        let index = self.position(TypeId::of::<S>())?;
        let entry = self.systems.remove(index);
        entry.registered.set(false);
        Some(entry)
    }

    /// The entry for system type `S`.
    #[must_use]
    pub fn get<S: System>(&self) -> Option<&SystemEntry> {
        self.position(TypeId::of::<S>()).map(|i| &*self.systems[i])
    }

    /// Registered systems, in run order.
    pub fn iter(&self) -> impl Iterator<Item = &SystemEntry> {
        self.systems.iter().map(|e| &**e)
    }

    /// A copy of the run list for one tick.
    pub(crate) fn snapshot(&self) -> Vec<Rc<SystemEntry>> {
        self.systems.clone()
    }

    /// Enable or disable every system.
    pub fn set_all_enabled(&self, enabled: bool) {
        for entry in &self.systems {
            entry.set_enabled(enabled);
            if !enabled {
                entry.last_run.set(Duration::ZERO);
            }
        }
    }

    /// Number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Counters for every system, in run order.
    #[must_use]
    pub fn stats(&self) -> Vec<SystemStats> {
        self.systems.iter().map(|e| e.stats()).collect()
    }

    fn position(&self, rust_type: TypeId) -> Option<usize> {
        self.systems.iter().position(|e| e.rust_type == rust_type)
    }
}
