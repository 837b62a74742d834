pub mod metrics;
pub mod model;
pub mod state;

pub use model::{ProbePhase, TabCtx};
pub use state::TabRegistry;
