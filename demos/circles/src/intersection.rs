//! Circle-circle intersection.

use glam::Vec2;
use serde::Serialize;

/// The two crossing points of a pair of circles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Intersection {
    pub first: Vec2,
    pub second: Vec2,
}

/// Intersection points of circle `a` (centre `pa`, radius `ra`) with circle
/// `b`, or `None` if the circles are apart, nested or concentric.
#[must_use]
pub fn intersect(pa: Vec2, ra: f32, pb: Vec2, rb: f32) -> Option<Intersection> {
    let delta = pb - pa;
    let d = delta.length();

    if d > ra + rb || d < (ra - rb).abs() || d == 0.0 {
        return None;
    }

    // Distance from `pa` to the chord's midpoint along the centre line.
    let a = (ra * ra - rb * rb + d * d) / (2.0 * d);
    let mid = pa + delta * (a / d);
    let h = (ra * ra - a * a).max(0.0).sqrt();
    let offset = Vec2::new(-delta.y, delta.x) * (h / d);

    Some(Intersection {
        first: mid + offset,
        second: mid - offset,
    })
}
