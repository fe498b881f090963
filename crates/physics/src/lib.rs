//! 2D rigid-body layer wrapping Rapier for the arena simulation.

pub mod collision;
pub mod events;
pub mod physics_world;

pub use collision::*;
pub use events::*;
pub use physics_world::*;

// Re-export Rapier for downstream crates
pub use rapier2d;

// Re-export common Rapier types
pub use rapier2d::prelude::{ColliderHandle, RigidBodyHandle};
