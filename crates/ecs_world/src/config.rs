//! World configuration.

use serde::Deserialize;

/// Tuning knobs for a [`World`](crate::World).
///
/// Both capacities only size the pools up front; they never cap growth.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Entity records preallocated in the entity pool.
    pub entity_pool_capacity: usize,
    /// Instances preallocated for every pooled component type on registration.
    pub component_pool_capacity: usize,
}

impl WorldConfig {
    /// Configuration with no preallocation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entity_pool_capacity: 0,
            component_pool_capacity: 0,
        }
    }

    /// Preallocate `capacity` entity records.
    #[must_use]
    pub fn with_entity_pool_capacity(mut self, capacity: usize) -> Self {
        self.entity_pool_capacity = capacity;
        self
    }

    /// Preallocate `capacity` instances per pooled component type.
    #[must_use]
    pub fn with_component_pool_capacity(mut self, capacity: usize) -> Self {
        self.component_pool_capacity = capacity;
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `json` is not a valid configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self::new()
    }
}
