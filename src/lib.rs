//! TabTally background coordinator.
//!
//! Counts how often each tracked tab's URL changes while it stays open,
//! distinguishing full navigations from same-document history-API
//! changes and breaking changes down by path/query/fragment deltas;
//! optionally probes page metadata (canonical link, Opengraph URL,
//! JSON-LD identifier) behind a per-origin permission gate and a per-tab
//! capability token.

pub mod config;
pub mod coordinator;
pub mod events;
pub mod replay;
pub mod router;

pub use config::{OracleKind, TallyConfig};
pub use coordinator::Coordinator;
pub use events::PlatformEvent;
pub use router::MessageRouter;

/// Register every collector the coordinator exports.
pub fn register_metrics(registry: &prometheus::Registry) {
    tabtally_registry::metrics::register_metrics(registry);
    tabtally_engine::metrics::register_metrics(registry);
}
