//! # ecs_world
//!
//! The tick-driven runtime built on [`ecs_component`].
//!
//! This crate provides:
//!
//! - [`EntityStore`] — entity table, component attachment, deferred removal.
//! - [`QueryIndex`] — canonical queries with eager membership and lazily
//!   rebuilt [`QueryResults`] projections.
//! - [`System`] / [`SystemDescriptor`] / [`SystemScheduler`] — ordered
//!   per-tick update functions bound to queries.
//! - [`World`] — the facade wiring the above, with [`World::run`] as the
//!   single per-tick entry point.
//! - [`WorldConfig`], [`WorldStats`], [`EcsError`].
//!
//! ## Tick
//!
//! ```text
//! World::run
//!   for each system, in registration order:
//!     skip if disabled or a mandatory query is empty
//!     prepare every bound query (rebuild projection if dirty)
//!     System::run(world, projections)
//!   EntityStore::process_deferred_removal
//! ```

pub mod config;
pub mod entity_store;
pub mod error;
pub mod query_index;
pub mod scheduler;
pub mod stats;
pub mod world;

pub use config::WorldConfig;
pub use entity_store::{EntityRecord, EntityStore, FlushSummary};
pub use error::EcsError;
pub use query_index::{QueryId, QueryIndex, QueryResults, QueryStats, Row, Shape};
pub use scheduler::{System, SystemDescriptor, SystemEntry, SystemScheduler, SystemStats};
pub use stats::{EntityStats, WorldStats};
pub use world::{EntityMut, World};
