//! Fixed-timestep driver.
//!
//! The runtime never decides when a tick happens; this loop does. Before
//! every tick it writes the frame timing into the clock entity's
//! [`PerformanceCompensation`], then calls [`World::run`].

use std::time::{Duration, Instant};

use ecs_component::Entity;
use ecs_world::World;
use tracing::{debug, info, warn};

use crate::components::PerformanceCompensation;

/// Configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

/// Owns a world and ticks it at a fixed rate.
#[derive(Debug)]
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    world: World,
    /// Entity whose [`PerformanceCompensation`] receives the frame timing.
    clock: Option<Entity>,
    elapsed: f64,
}

impl TickLoop {
    #[must_use]
    pub fn new(config: TickConfig, world: World) -> Self {
        Self {
            tick_id: 0,
            config,
            world,
            clock: None,
            elapsed: 0.0,
        }
    }

    /// Publish frame timing to `entity` before every tick.
    #[must_use]
    pub fn with_clock(mut self, entity: Entity) -> Self {
        self.clock = Some(entity);
        self
    }

    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Consume the loop and hand back the world.
    #[must_use]
    pub fn into_world(self) -> World {
        self.world
    }

    /// Run one tick of `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        self.tick_id += 1;
        self.elapsed += dt;

        let world = &mut self.world;
        if let Some(clock) = self.clock
            && let Some(timing) = world.get_component_mut::<PerformanceCompensation>(clock)
        {
            timing.delta = dt as f32;
            timing.time = self.elapsed as f32;
        }

        self.world.run();

        debug!(
            tick_id = self.tick_id,
            dt,
            entities = self.world.entity_count(),
            "tick complete"
        );
    }

    /// Run for the configured number of ticks, or indefinitely.
    pub fn run(&mut self) {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            self.tick(tick_duration.as_secs_f64());

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}
