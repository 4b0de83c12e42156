//! Headless circles simulation.
//!
//! Spawns a field of moving circles, ticks the world at a fixed rate, and
//! reports what the renderer drew plus the world statistics at the end.

use anyhow::{Context, Result};
use clap::Parser;
use ecs_world::{World, WorldConfig};
use glam::Vec2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use circles::components::CanvasContext;
use circles::scene;
use circles::systems;
use circles::tick::{TickConfig, TickLoop};

#[derive(Parser)]
#[command(
    name = "circles",
    about = "Headless circles simulation on the ECS runtime"
)]
struct Args {
    /// Number of ticks to run
    #[arg(short, long, default_value_t = 300)]
    ticks: u64,

    /// Number of circles to spawn
    #[arg(short, long, default_value_t = 200)]
    circles: usize,

    /// Target ticks per second
    #[arg(long, default_value_t = 60.0)]
    tick_rate: f64,

    /// Seed for circle placement
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 1280.0)]
    width: f32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 720.0)]
    height: f32,
}

fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("circles=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    info!(circles = args.circles, seed = args.seed, "circles starting");

    let mut world = World::with_config(
        WorldConfig::new()
            .with_entity_pool_capacity(args.circles + 1)
            .with_component_pool_capacity(args.circles),
    );
    systems::register_all(&mut world);

    let singleton = scene::spawn_singleton(&mut world, args.width, args.height)
        .context("failed to create the singleton entity")?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let size = Vec2::new(args.width, args.height);
    scene::spawn_random_circles(&mut world, &mut rng, args.circles, size)
        .context("failed to spawn circles")?;

    let config = TickConfig {
        tick_rate: args.tick_rate,
        max_ticks: args.ticks,
    };
    let mut tick_loop = TickLoop::new(config, world).with_clock(singleton);
    tick_loop.run();

    let world = tick_loop.into_world();
    if let Some(canvas) = world.get_component::<CanvasContext>(singleton) {
        let (clears, outlines, dots, chords) = canvas.command_counts();
        info!(clears, outlines, dots, chords, "last frame");
    }
    println!("{}", world.stats());

    info!("circles shut down");
    Ok(())
}
