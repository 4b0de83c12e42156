//! Scene setup helpers.

use ecs_component::Entity;
use ecs_world::{EcsError, World};
use glam::Vec2;
use rand::Rng;

use crate::components::{
    Acceleration, CanvasContext, Circle, DemoSettings, PerformanceCompensation, Position, Velocity,
};

/// Create the singleton entity holding the frame timing, the canvas and
/// the demo settings.
///
/// # Errors
///
/// Propagates entity errors from the world.
pub fn spawn_singleton(world: &mut World, width: f32, height: f32) -> Result<Entity, EcsError> {
    let entity = world
        .spawn()
        .add_component::<PerformanceCompensation>()?
        .insert_component(CanvasContext::new(width, height))?
        .add_component::<DemoSettings>()?
        .id();
    Ok(entity)
}

/// Create one moving circle.
///
/// # Errors
///
/// Propagates entity errors from the world.
pub fn spawn_circle(
    world: &mut World,
    at: Vec2,
    radius: f32,
    velocity: Vec2,
) -> Result<Entity, EcsError> {
    let entity = world
        .spawn()
        .add_component_with::<Circle>(|c| c.radius = radius)?
        .add_component_with::<Velocity>(|v| v.linear = velocity)?
        .add_component::<Acceleration>()?
        .add_component_with::<Position>(|p| p.point = at)?
        .id();
    Ok(entity)
}

/// Scatter `count` circles with random radius and velocity over a canvas
/// of the given size.
///
/// # Errors
///
/// Propagates entity errors from the world.
pub fn spawn_random_circles(
    world: &mut World,
    rng: &mut impl Rng,
    count: usize,
    size: Vec2,
) -> Result<Vec<Entity>, EcsError> {
    (0..count)
        .map(|_| {
            let at = Vec2::new(rng.gen_range(0.0..size.x), rng.gen_range(0.0..size.y));
            let radius = rng.gen_range(10.0..50.0);
            let velocity = Vec2::new(rng.gen_range(-200.0..200.0), rng.gen_range(-200.0..200.0));
            spawn_circle(world, at, radius, velocity)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_spawn_random_circles_is_seeded() {
        let positions = |seed| {
            let mut world = World::new();
            let mut rng = StdRng::seed_from_u64(seed);
            let size = Vec2::new(640.0, 480.0);
            let entities = spawn_random_circles(&mut world, &mut rng, 4, size).unwrap();
            entities
                .iter()
                .map(|e| world.get_component::<Position>(*e).unwrap().point)
                .collect::<Vec<_>>()
        };
        assert_eq!(positions(7), positions(7));
        assert_ne!(positions(7), positions(8));
    }

    #[test]
    fn test_singleton_components() {
        let mut world = World::new();
        let e = spawn_singleton(&mut world, 320.0, 200.0).unwrap();
        let canvas = world.get_component::<CanvasContext>(e).unwrap();
        assert_eq!((canvas.width, canvas.height), (320.0, 200.0));
        assert_eq!(
            world.get_component::<DemoSettings>(e),
            Some(&DemoSettings::default())
        );
    }
}
