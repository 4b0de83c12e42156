//! Read-only diagnostic snapshot of a [`World`](crate::World).

use std::fmt;

use ecs_component::PoolStats;
use serde::Serialize;

use crate::query_index::QueryStats;
use crate::scheduler::SystemStats;

/// Entity table counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    /// Tracked entities, including removed ones awaiting release.
    pub tracked: usize,
    pub alive: usize,
    /// Reset records waiting for reuse.
    pub pooled: usize,
    /// Entities queued for release at the next flush.
    pub pending_release: usize,
}

/// Snapshot returned by [`World::stats`](crate::World::stats).
///
/// `Display` renders the snapshot as pretty-printed JSON.
#[derive(Debug, Clone, Serialize)]
pub struct WorldStats {
    /// Ticks executed so far.
    pub tick: u64,
    pub enabled: bool,
    pub entities: EntityStats,
    pub queries: Vec<QueryStats>,
    pub pools: Vec<PoolStats>,
    pub systems: Vec<SystemStats>,
}

impl fmt::Display for WorldStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
