//! Systems of the circles simulation, in the order they are registered.
//!
//! Movement and intersection update the simulation; the three renderer
//! systems draw a frame into the [`CanvasContext`] of the singleton entity as
//! a list of [`DrawCommand`]s.

use ecs_component::{Entity, QueryDescriptor};
use ecs_world::{QueryResults, System, SystemDescriptor, World};
use glam::Vec2;
use tracing::warn;

use crate::components::{
    Acceleration, CanvasContext, Circle, DemoSettings, DrawCommand, Intersecting,
    PerformanceCompensation, Position, Velocity,
};
use crate::intersection::{Intersection, intersect};

/// Register every circles system in run order.
pub fn register_all(world: &mut World) {
    world
        .register_system::<MovementSystem>()
        .register_system::<IntersectionSystem>()
        .register_system::<RendererBackground>()
        .register_system::<RendererCircles>()
        .register_system::<RendererIntersecting>();
}

/// Moves circles, decays their acceleration and wraps them around the
/// canvas edges. Gated on the singleton context.
#[derive(Debug, Default)]
pub struct MovementSystem;

impl System for MovementSystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("movement")
            .query(
                QueryDescriptor::new()
                    .read::<Circle>()
                    .write::<Velocity>()
                    .write::<Acceleration>()
                    .write::<Position>(),
            )
            .query(
                QueryDescriptor::new()
                    .read::<PerformanceCompensation>()
                    .read::<CanvasContext>()
                    .read::<DemoSettings>()
                    .mandatory(),
            )
    }

    fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
        let Some(context) = queries[1].first() else {
            return;
        };
        let (Some(timing), Some(size), Some(settings)) = (
            context.get::<PerformanceCompensation>(world).copied(),
            context
                .get::<CanvasContext>(world)
                .map(|c| Vec2::new(c.width, c.height)),
            context.get::<DemoSettings>(world).copied(),
        ) else {
            return;
        };
        let step = timing.delta * settings.speed_multiplier;

        for row in queries[0].iter() {
            let (Some(radius), Some(velocity)) = (
                row.get::<Circle>(world).map(|c| c.radius),
                row.get::<Velocity>(world).map(|v| v.linear),
            ) else {
                continue;
            };
            let Some((acceleration, position)) =
                row.get_pair_mut::<Acceleration, Position>(world)
            else {
                continue;
            };

            position.point += velocity * acceleration.factor * step;
            acceleration.factor = (acceleration.factor - Vec2::splat(step)).max(Vec2::ONE);
            position.point = wrap(position.point, radius, size);
        }
    }
}

/// Teleport a circle that left the canvas to the opposite edge.
fn wrap(mut point: Vec2, radius: f32, size: Vec2) -> Vec2 {
    if point.y + radius < 0.0 {
        point.y = size.y + radius;
    }
    if point.y - radius > size.y {
        point.y = -radius;
    }
    if point.x - radius > size.x {
        point.x = -radius;
    }
    if point.x + radius < 0.0 {
        point.x = size.x + radius;
    }
    point
}

/// Tags every circle crossing another one with [`Intersecting`], holding
/// the crossing points. The tag is removed once a circle is clear again.
#[derive(Debug, Default)]
pub struct IntersectionSystem {
    bodies: Vec<(Entity, Vec2, f32)>,
    hits: Vec<Intersection>,
}

impl System for IntersectionSystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("intersection")
            .query(QueryDescriptor::new().read::<Circle>().read::<Position>())
    }

    fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
        let view: &World = world;
        self.bodies.clear();
        self.bodies.extend(queries[0].iter().filter_map(|row| {
            Some((
                row.entity(),
                row.get::<Position>(view)?.point,
                row.get::<Circle>(view)?.radius,
            ))
        }));

        for i in 0..self.bodies.len() {
            let (entity, pa, ra) = self.bodies[i];
            self.hits.clear();
            for (j, &(_, pb, rb)) in self.bodies.iter().enumerate() {
                if i != j
                    && let Some(hit) = intersect(pa, ra, pb, rb)
                {
                    self.hits.push(hit);
                }
            }

            if self.hits.is_empty() {
                if let Err(err) = world.remove_component::<Intersecting>(entity, false) {
                    warn!(%entity, %err, "could not clear intersection");
                }
                continue;
            }
            if let Err(err) = world.add_component::<Intersecting>(entity) {
                warn!(%entity, %err, "could not tag intersection");
                continue;
            }
            if let Some(intersecting) = world.get_component_mut::<Intersecting>(entity) {
                intersecting.points.clear();
                intersecting.points.extend_from_slice(&self.hits);
            }
        }
    }
}

/// Starts a frame: clears the canvas.
#[derive(Debug, Default)]
pub struct RendererBackground;

impl System for RendererBackground {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("renderer_background")
            .query(QueryDescriptor::new().write::<CanvasContext>().mandatory())
    }

    fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
        for row in queries[0].iter() {
            if let Some(canvas) = row.get_mut::<CanvasContext>(world) {
                canvas.commands.clear();
                let size = Vec2::new(canvas.width, canvas.height);
                canvas.commands.push(DrawCommand::Clear { size });
            }
        }
    }
}

/// Outlines every circle.
#[derive(Debug, Default)]
pub struct RendererCircles {
    buffer: Vec<DrawCommand>,
}

impl System for RendererCircles {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("renderer_circles")
            .query(QueryDescriptor::new().read::<Circle>().read::<Position>())
            .query(QueryDescriptor::new().write::<CanvasContext>().mandatory())
    }

    fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
        self.buffer.clear();
        for row in queries[0].iter() {
            if let (Some(circle), Some(position)) =
                (row.get::<Circle>(world), row.get::<Position>(world))
            {
                self.buffer.push(DrawCommand::StrokeCircle {
                    center: position.point,
                    radius: circle.radius,
                });
            }
        }
        draw(world, &queries[1], &self.buffer);
    }
}

/// Marks intersection points and joins each pair with a chord.
#[derive(Debug, Default)]
pub struct RendererIntersecting {
    buffer: Vec<DrawCommand>,
}

impl System for RendererIntersecting {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("renderer_intersecting")
            .query(QueryDescriptor::new().read::<Intersecting>())
            .query(QueryDescriptor::new().write::<CanvasContext>().mandatory())
    }

    fn run(&mut self, world: &mut World, queries: &[QueryResults]) {
        self.buffer.clear();
        for row in queries[0].iter() {
            let Some(intersecting) = row.get::<Intersecting>(world) else {
                continue;
            };
            for hit in &intersecting.points {
                for radius in [8.0, 3.0] {
                    self.buffer.push(DrawCommand::FillCircle {
                        center: hit.first,
                        radius,
                    });
                    self.buffer.push(DrawCommand::FillCircle {
                        center: hit.second,
                        radius,
                    });
                }
                self.buffer.push(DrawCommand::Line {
                    from: hit.first,
                    to: hit.second,
                });
            }
        }
        draw(world, &queries[1], &self.buffer);
    }
}

/// Append `commands` to the canvas of the first row of `canvas`.
fn draw(world: &mut World, canvas: &QueryResults, commands: &[DrawCommand]) {
    if let Some(row) = canvas.first()
        && let Some(canvas) = row.get_mut::<CanvasContext>(world)
    {
        canvas.commands.extend_from_slice(commands);
    }
}
