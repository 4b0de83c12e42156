//! Component definitions for the circles simulation.

use ecs_component::Component;
use glam::Vec2;
use serde::Serialize;

use crate::intersection::Intersection;

/// Centre of a circle, in canvas pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Position {
    pub point: Vec2,
}

impl Position {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            point: Vec2::new(x, y),
        }
    }
}

impl Component for Position {
    fn type_name() -> &'static str {
        "Position"
    }
}

/// Pixels per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Velocity {
    pub linear: Vec2,
}

impl Velocity {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            linear: Vec2::new(x, y),
        }
    }
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

/// Per-axis velocity multiplier. Decays back towards 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Acceleration {
    pub factor: Vec2,
}

impl Default for Acceleration {
    fn default() -> Self {
        Self { factor: Vec2::ONE }
    }
}

impl Component for Acceleration {
    fn type_name() -> &'static str {
        "Acceleration"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Circle {
    pub radius: f32,
}

impl Component for Circle {
    fn type_name() -> &'static str {
        "Circle"
    }
}

/// Intersection points of a circle with every other circle it crosses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intersecting {
    pub points: Vec<Intersection>,
}

impl Component for Intersecting {
    fn type_name() -> &'static str {
        "Intersecting"
    }

    fn reset(&mut self) {
        self.points.clear();
    }
}

/// One primitive emitted by the renderer systems.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DrawCommand {
    Clear { size: Vec2 },
    StrokeCircle { center: Vec2, radius: f32 },
    FillCircle { center: Vec2, radius: f32 },
    Line { from: Vec2, to: Vec2 },
}

/// Headless drawing surface. Lives on the singleton entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasContext {
    pub width: f32,
    pub height: f32,
    /// Commands of the frame drawn this tick.
    pub commands: Vec<DrawCommand>,
}

impl CanvasContext {
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    /// Number of commands of each kind: `(clears, circles, fills, lines)`.
    #[must_use]
    pub fn command_counts(&self) -> (usize, usize, usize, usize) {
        self.commands
            .iter()
            .fold((0, 0, 0, 0), |(c, s, f, l), cmd| match cmd {
                DrawCommand::Clear { .. } => (c + 1, s, f, l),
                DrawCommand::StrokeCircle { .. } => (c, s + 1, f, l),
                DrawCommand::FillCircle { .. } => (c, s, f + 1, l),
                DrawCommand::Line { .. } => (c, s, f, l + 1),
            })
    }
}

impl Component for CanvasContext {
    fn type_name() -> &'static str {
        "CanvasContext"
    }

    fn reset(&mut self) {
        self.width = 0.0;
        self.height = 0.0;
        self.commands.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DemoSettings {
    pub speed_multiplier: f32,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
        }
    }
}

impl Component for DemoSettings {
    fn type_name() -> &'static str {
        "DemoSettings"
    }
}

/// Frame timing, written by the driver before every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceCompensation {
    /// Seconds since the previous tick.
    pub delta: f32,
    /// Seconds since the driver started.
    pub time: f32,
}

impl Component for PerformanceCompensation {
    fn type_name() -> &'static str {
        "PerformanceCompensation"
    }
}
