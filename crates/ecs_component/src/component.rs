//! Core [`Component`] trait and associated metadata.
//!
//! Every piece of data attached to an entity implements [`Component`]. The
//! trait carries the type's pooling contract: how an instance is restored to
//! its defaults when it goes back to the pool, and whether the type wants to
//! be pooled at all.
//!
//! ## Type Identity
//!
//! [`ComponentTypeId`] is a dense integer handle issued by the
//! [`ComponentRegistry`](crate::ComponentRegistry) the first time a type is
//! seen. Handles index straight into the registry's pool table, so the hot
//! path never hashes a type name.

use std::any::TypeId;

use serde::{Deserialize, Serialize};

/// A handle for a registered component type.
///
/// Handles are issued in registration order starting at 0 and are only
/// meaningful for the registry (and therefore the world) that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u32);

impl ComponentTypeId {
    /// Returns the handle as a table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Lifecycle category of a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Ordinary data. Removed by bulk removal and entity removal.
    #[default]
    Data,
    /// Survives bulk removal and entity removal. Only an explicit
    /// `remove_component` detaches it, which lets a system release an
    /// external resource tied to the entity before the entity goes away.
    SystemState,
}

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentMeta {
    /// The handle issued at registration.
    pub id: ComponentTypeId,
    /// The human-readable name of the component (e.g. `"Position"`).
    pub name: &'static str,
    /// The Rust type behind the handle.
    pub rust_type: TypeId,
    /// Lifecycle category.
    pub kind: ComponentKind,
    /// Whether released instances are reset and reused.
    pub pooled: bool,
}

impl ComponentMeta {
    /// Build the metadata for `T` under the given handle.
    #[must_use]
    pub fn of<T: Component>(id: ComponentTypeId) -> Self {
        Self {
            id,
            name: T::type_name(),
            rust_type: TypeId::of::<T>(),
            kind: T::KIND,
            pooled: T::POOLED,
        }
    }

    /// Returns `true` if bulk removal must leave this type attached.
    #[must_use]
    pub fn is_system_state(&self) -> bool {
        self.kind == ComponentKind::SystemState
    }
}

/// The core component trait.
///
/// `Default` supplies the documented default field values. Instances are
/// recycled through a per-type pool, so [`Component::reset`] must leave an
/// instance indistinguishable from `Self::default()`.
///
/// # Examples
///
/// ```rust
/// use ecs_component::Component;
///
/// #[derive(Debug, Default)]
/// struct Trail {
///     points: Vec<(f32, f32)>,
/// }
///
/// impl Component for Trail {
///     fn type_name() -> &'static str { "Trail" }
///
///     // Keep the allocation around for the next owner.
///     fn reset(&mut self) {
///         self.points.clear();
///     }
/// }
/// ```
pub trait Component: Default + 'static {
    /// Lifecycle category of this type.
    const KIND: ComponentKind = ComponentKind::Data;

    /// When `false`, released instances are dropped and replaced by a fresh
    /// `Self::default()` instead of being reset in place.
    const POOLED: bool = true;

    /// A human-readable name for this component type.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Restore default field values before the instance returns to its pool.
    fn reset(&mut self) {
        *self = Self::default();
    }
}
