//! TabTally's baseline/transition engine and probe coordinator.

mod engine;
pub mod metrics;
mod probe;
pub mod snapshot;

pub use engine::{EngineConfig, TransitionEngine};
pub use probe::ProbeCoordinator;
