//! System-state components: a sprite whose backing resources outlive it.
//!
//! [`SpriteResources`] is a system-state component. Removing a [`Sprite`],
//! or removing the whole entity, leaves the resources attached, so the
//! [`SpriteResourceSystem`] can find them through `[Not(Sprite),
//! Read(SpriteResources)]` and free them explicitly. A removed entity stays
//! tracked until that happens.

use ecs_component::{Component, ComponentKind, Entity, QueryDescriptor};
use ecs_world::{QueryResults, System, SystemDescriptor, World};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub name: String,
}

impl Default for Sprite {
    fn default() -> Self {
        Self {
            name: "empty".to_string(),
        }
    }
}

impl Component for Sprite {
    fn type_name() -> &'static str {
        "Sprite"
    }

    fn reset(&mut self) {
        self.name.clear();
        self.name.push_str("empty");
    }
}

/// Memory held on behalf of a sprite.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpriteResources {
    /// Kilobytes.
    pub size: u32,
    pub mem_position: u32,
}

impl Component for SpriteResources {
    const KIND: ComponentKind = ComponentKind::SystemState;

    fn type_name() -> &'static str {
        "SpriteResources"
    }
}

/// Allocates resources for new sprites and frees those left behind.
#[derive(Debug)]
pub struct SpriteResourceSystem {
    rng: StdRng,
    /// Allocations made so far.
    pub allocated: u32,
    /// Allocations freed so far.
    pub freed: u32,
}

impl SpriteResourceSystem {
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            allocated: 0,
            freed: 0,
        }
    }

    /// Allocations currently alive.
    #[must_use]
    pub fn live(&self) -> u32 {
        self.allocated - self.freed
    }
}

impl Default for SpriteResourceSystem {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl System for SpriteResourceSystem {
    fn descriptor(&self) -> SystemDescriptor {
        let unbacked = QueryDescriptor::new()
            .read::<Sprite>()
            .not::<SpriteResources>();
        let orphaned = QueryDescriptor::new()
            .not::<Sprite>()
            .read::<SpriteResources>();
        let backed = QueryDescriptor::new()
            .read::<Sprite>()
            .read::<SpriteResources>();
        SystemDescriptor::new("sprite_resources")
            .query(unbacked)
            .query(orphaned)
            .query(backed)
    }

    fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
        for &entity in queries[0].entities() {
            let resources = SpriteResources {
                mem_position: self.rng.gen_range(0..1000),
                size: self.rng.gen_range(100..1000),
            };
            info!(
                %entity,
                mem_position = resources.mem_position,
                size_kb = resources.size,
                "allocating sprite resources"
            );
            match world.insert_component(entity, resources) {
                Ok(_) => self.allocated += 1,
                Err(err) => warn!(%entity, %err, "could not attach sprite resources"),
            }
        }

        for row in queries[1].iter() {
            let entity = row.entity();
            let Some(resources) = row.get::<SpriteResources>(world).copied() else {
                continue;
            };
            info!(
                %entity,
                mem_position = resources.mem_position,
                size_kb = resources.size,
                "freeing sprite resources"
            );
            if let Ok(true) = world.remove_component::<SpriteResources>(entity, false) {
                self.freed += 1;
            }
        }
    }
}

/// One step of the scripted walkthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateEntity,
    AddSprite,
    RemoveSprite,
    RemoveSpriteResources,
    RemoveEntity,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::CreateEntity,
        Action::AddSprite,
        Action::RemoveSprite,
        Action::RemoveSpriteResources,
        Action::RemoveEntity,
    ];

    /// Pick an action at random.
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

/// A random tracked entity, removed ones included.
pub fn random_entity(world: &World, rng: &mut impl Rng) -> Option<Entity> {
    let count = world.entities().count();
    if count == 0 {
        return None;
    }
    let index = rng.gen_range(0..count);
    world.entities().records().nth(index).map(|r| r.id())
}

/// Apply `action` to a random entity (or a new one). Returns the entity
/// acted upon.
pub fn apply(world: &mut World, action: Action, rng: &mut impl Rng) -> Option<Entity> {
    if action == Action::CreateEntity {
        let entity = world.create_entity();
        info!(%entity, "> created entity");
        return Some(entity);
    }

    let entity = random_entity(world, rng)?;
    let outcome = match action {
        Action::AddSprite => {
            info!(%entity, "> adding sprite");
            world.add_component::<Sprite>(entity).map(|_| ())
        }
        Action::RemoveSprite => {
            let name = world
                .get_component::<Sprite>(entity)
                .map_or("-", |s| s.name.as_str());
            info!(%entity, sprite = name, "> removing sprite");
            world.remove_component::<Sprite>(entity, false).map(|_| ())
        }
        Action::RemoveSpriteResources => {
            info!(%entity, "> removing sprite resources");
            world
                .remove_component::<SpriteResources>(entity, false)
                .map(|_| ())
        }
        Action::RemoveEntity => {
            info!(%entity, "> removing entity");
            world.remove_entity(entity, false)
        }
        Action::CreateEntity => Ok(()),
    };
    if let Err(err) = outcome {
        warn!(%entity, %err, "action rejected");
    }
    Some(entity)
}
