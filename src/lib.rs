//! A 2D artificial-life engine: soft-bodied creatures with evolved,
//! REINFORCE-trained brains living in a shared Stable-Fluids field.
//!
//! The engine is headless by design — [`world::World`] owns every piece of
//! simulation state and [`world::World::tick`] advances it by one step.
//! A host (a renderer, a CLI, a server loop) drives the clock, paints the
//! scalar fields, and reads back creature/particle state for display; none
//! of that lives in this crate.

pub mod config;
pub mod creature;
pub mod error;
pub mod fields;
pub mod fluid;
pub mod grid;
pub mod math;
pub mod particle;
pub mod persistence;
pub mod random;
pub mod reproduction;
pub mod telemetry;
pub mod world;

pub use config::SimulationConfig;
pub use creature::Creature;
pub use error::{ConfigError, PersistenceError};
pub use telemetry::Telemetry;
pub use world::{VelocityEmitter, World};
