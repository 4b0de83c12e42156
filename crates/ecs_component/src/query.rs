//! Query descriptors for system data access declarations.
//!
//! A [`QueryDescriptor`] is an ordered list of [`Term`]s, each pairing an
//! [`Operator`] with a component type. Systems declare their descriptors at
//! registration time; the world resolves each term to a
//! [`ComponentTypeId`] and canonicalizes the resolved shape so that every
//! system declaring the same set of terms shares one live query.

use std::any::TypeId;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentTypeId};
use crate::registry::ComponentRegistry;

/// Membership predicate applied to one component type.
///
/// Only [`Operator::Not`] requires absence. The write family
/// (`Write`, `Add`, `Remove`, `Change`) requires presence exactly like
/// [`Operator::Read`]; the distinct tags document intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    Read,
    Write,
    Add,
    Remove,
    Change,
    Not,
}

impl Operator {
    /// Returns `true` if the entity must have the type to match.
    #[must_use]
    pub const fn requires_presence(self) -> bool {
        !matches!(self, Operator::Not)
    }

    /// Lower-case tag used in query keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operator::Read => "read",
            Operator::Write => "write",
            Operator::Add => "add",
            Operator::Remove => "remove",
            Operator::Change => "change",
            Operator::Not => "not",
        }
    }

    /// Evaluate the predicate given whether the entity has the type.
    #[must_use]
    pub const fn accepts(self, has_component: bool) -> bool {
        has_component == self.requires_presence()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(operator, component type)` pair of a query declaration.
///
/// The component type is captured as a registration function, so a
/// descriptor can be written before its types are registered.
#[derive(Clone, Copy)]
pub struct Term {
    pub operator: Operator,
    rust_type: TypeId,
    type_name: &'static str,
    register: fn(&mut ComponentRegistry) -> ComponentTypeId,
}

impl Term {
    /// A term over component type `T`.
    #[must_use]
    pub fn new<T: Component>(operator: Operator) -> Self {
        Self {
            operator,
            rust_type: TypeId::of::<T>(),
            type_name: T::type_name(),
            register: ComponentRegistry::register::<T>,
        }
    }

    /// Name of the component type this term refers to.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if this term refers to component type `T`.
    #[must_use]
    pub fn is<T: Component>(&self) -> bool {
        self.rust_type == TypeId::of::<T>()
    }

    /// Resolve the component type against `registry`, registering it if
    /// needed.
    pub fn resolve(&self, registry: &mut ComponentRegistry) -> (Operator, ComponentTypeId) {
        (self.operator, (self.register)(registry))
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.operator, self.type_name)
    }
}

/// Declares one query shape of a system.
#[derive(Debug, Clone, Default)]
pub struct QueryDescriptor {
    /// Terms in declaration order.
    pub terms: Vec<Term>,
    /// An empty mandatory query suppresses its system for the tick.
    pub mandatory: bool,
}

impl QueryDescriptor {
    /// Create a new empty query descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a term with an explicit operator.
    #[must_use]
    pub fn with<T: Component>(mut self, operator: Operator) -> Self {
        self.terms.push(Term::new::<T>(operator));
        self
    }

    /// Entity must have `T`.
    #[must_use]
    pub fn read<T: Component>(self) -> Self {
        self.with::<T>(Operator::Read)
    }

    /// Entity must have `T`; the system intends to mutate it.
    #[must_use]
    pub fn write<T: Component>(self) -> Self {
        self.with::<T>(Operator::Write)
    }

    /// Entity must have `T`; tagged as an addition of interest.
    #[must_use]
    pub fn add<T: Component>(self) -> Self {
        self.with::<T>(Operator::Add)
    }

    /// Entity must have `T`; tagged as a removal of interest.
    #[must_use]
    pub fn remove<T: Component>(self) -> Self {
        self.with::<T>(Operator::Remove)
    }

    /// Entity must have `T`; tagged as a change of interest.
    #[must_use]
    pub fn change<T: Component>(self) -> Self {
        self.with::<T>(Operator::Change)
    }

    /// Entity must NOT have `T`.
    #[must_use]
    pub fn not<T: Component>(self) -> Self {
        self.with::<T>(Operator::Not)
    }

    /// Gate the owning system on this query being non-empty.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Resolve every term against `registry`, in declaration order.
    pub fn resolve(&self, registry: &mut ComponentRegistry) -> Vec<(Operator, ComponentTypeId)> {
        self.terms.iter().map(|t| t.resolve(registry)).collect()
    }
}
