//! Scripted walkthrough of system-state components.
//!
//! Each step applies a random action (create an entity, add or remove a
//! sprite, remove the sprite resources, remove an entity) and runs one
//! tick, logging what the sprite resource system allocates and frees.

use anyhow::Result;
use clap::Parser;
use ecs_world::World;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use circles::sprites::{self, Action, Sprite, SpriteResourceSystem, SpriteResources};

#[derive(Parser)]
#[command(name = "system_state", about = "System-state component walkthrough")]
struct Args {
    /// Number of scripted steps
    #[arg(short, long, default_value_t = 40)]
    ticks: u64,

    /// Seed for action selection and resource allocation
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("system_state=info".parse()?)
                .add_directive("circles=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut world = World::new();
    world.register_component::<Sprite>();
    world.register_component::<SpriteResources>();
    let resources = SpriteResourceSystem::with_seed(args.seed);
    world.register_system_instance(resources);

    let mut rng = StdRng::seed_from_u64(args.seed);
    for step in 0..args.ticks {
        let action = Action::random(&mut rng);
        info!(step, ?action, "step");
        sprites::apply(&mut world, action, &mut rng);
        world.run();
    }

    if let Some(system) = world.system::<SpriteResourceSystem>() {
        info!(
            allocated = system.allocated,
            freed = system.freed,
            live = system.live(),
            "walkthrough complete"
        );
    }
    println!("{}", world.stats());
    Ok(())
}
