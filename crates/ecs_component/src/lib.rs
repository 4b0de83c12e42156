//! # ecs_component
//!
//! Component types, their pooled storage, and the query shapes systems use
//! to ask for them.
//!
//! This crate provides:
//!
//! - [`Component`] trait — default values, reset contract, pooling opt-out.
//! - [`Entity`] — lightweight `u64` entity identifiers.
//! - [`EntityAllocator`] — issues handles that are never reused.
//! - [`ComponentPool`] — per-type slab of reusable instances.
//! - [`ComponentRegistry`] — handle issuance and the pool table.
//! - [`QueryDescriptor`] — declarative operator/type query shapes.

pub mod component;
pub mod entity;
pub mod pool;
pub mod query;
pub mod registry;

pub use component::{Component, ComponentKind, ComponentMeta, ComponentTypeId};
pub use entity::{Entity, EntityAllocator};
pub use pool::{ComponentPool, ComponentSlot, ErasedPool, PoolStats};
pub use query::{Operator, QueryDescriptor, Term};
pub use registry::ComponentRegistry;
