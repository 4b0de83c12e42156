//! # circles
//!
//! Demonstration code built only on the public API of [`ecs_world`].
//!
//! This crate provides:
//!
//! - [`components`] — circle simulation data, plus a headless
//!   [`CanvasContext`](components::CanvasContext) that collects draw commands.
//! - [`systems`] — movement, circle intersection, and three renderer stages.
//! - [`scene`] — singleton and circle spawning.
//! - [`sprites`] — the system-state component walkthrough.
//! - [`tick`] — a fixed-timestep [`TickLoop`](tick::TickLoop) driver.

pub mod components;
pub mod intersection;
pub mod scene;
pub mod sprites;
pub mod systems;
pub mod tick;
