//! Runtime error types.

use ecs_component::Entity;

/// Errors surfaced by entity and component mutations.
///
/// Both variants signal a caller-side invariant violation (a stale or
/// double-freed handle). The operation is aborted without touching any
/// state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The handle is not tracked by the entity store.
    #[error("entity {0} is not tracked by this world")]
    EntityNotFound(Entity),

    /// The entity was already removed and is only awaiting release.
    #[error("entity {0} has already been removed")]
    EntityRemoved(Entity),
}
