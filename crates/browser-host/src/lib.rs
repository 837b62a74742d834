//! Host-browser adapter seam.
//!
//! [`BrowserHost`] is the trait the coordinator wires against: live tab
//! queries, probe injection, message delivery, badge painting. A real
//! add-on backs it with the platform's tab/scripting/action APIs; this
//! crate ships [`SimulatedHost`], the in-memory implementation that
//! drives the replay CLI and the integration tests.

mod simulated;

pub use simulated::SimulatedHost;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use probe_bridge::Outbound;
use tabtally_core_types::TabId;

/// Platform call failures. Callers in the engine treat every variant as
/// transient and degrade to a no-op.
#[derive(Clone, Debug, Error)]
pub enum HostError {
    #[error("no such tab: {0}")]
    NoSuchTab(TabId),
    #[error("platform call failed: {0}")]
    Platform(String),
}

#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// The tab's URL as the platform sees it *right now* — not the URL
    /// any earlier event carried. `Ok(None)` when the tab has no
    /// committed URL yet.
    async fn live_tab_url(&self, tab: TabId) -> Result<Option<Url>, HostError>;

    /// The currently focused tab, if any.
    async fn active_tab(&self) -> Result<Option<TabId>, HostError>;

    /// Inject (or re-inject) the identifier probe into `tab`.
    async fn inject_probe(&self, tab: TabId) -> Result<(), HostError>;

    async fn deliver_to_tab(&self, tab: TabId, message: Outbound) -> Result<(), HostError>;

    async fn deliver_to_ui(&self, message: Outbound) -> Result<(), HostError>;

    /// Paint the toolbar badge for `tab`. Empty string clears it.
    async fn set_badge_text(&self, tab: TabId, text: &str) -> Result<(), HostError>;
}
