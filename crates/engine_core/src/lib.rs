//! Core types shared by the simulation crates:
//! - deterministic per-environment RNG
//! - scaling helpers for observation encoding and weapon jitter
//! - entity tags and the packed handles stored in physics user data
//! - index-stable slot arenas for short-lived entities

pub mod arena;
pub mod handle;
pub mod math;
pub mod rng;

pub use arena::*;
pub use handle::*;
pub use math::*;
pub use rng::*;

// Re-export commonly used types
pub use glam::Vec2;
