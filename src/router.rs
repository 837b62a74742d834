//! The secure messaging boundary.
//!
//! Every inbound message is authenticated before it can touch the engine:
//! UI requests by sender origin, probe reports by injection record plus
//! the tab's current capability token plus a live permission check. A
//! failed check drops the message — the sender gets no response and no
//! error shape, only the drop metric moves.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use browser_host::BrowserHost;
use permissions_oracle::PermissionsOracle;
use probe_bridge::{
    BridgeError, NonceLedger, Outbound, ProbeMessage, Sender, SenderKind, UiRequest,
};
use tabtally_core_types::{Origin, TabId, TabSnapshot};
use tabtally_engine::{metrics, TransitionEngine};

/// Sentinel used when a UI request names no tab and none is active; the
/// platform uses -1 the same way.
pub const NO_TAB: TabId = TabId(-1);

pub struct MessageRouter {
    engine: Arc<TransitionEngine>,
    ledger: Arc<NonceLedger>,
    host: Arc<dyn BrowserHost>,
    oracle: Arc<dyn PermissionsOracle>,
    ui_origin: String,
}

impl MessageRouter {
    pub fn new(
        engine: Arc<TransitionEngine>,
        ledger: Arc<NonceLedger>,
        host: Arc<dyn BrowserHost>,
        oracle: Arc<dyn PermissionsOracle>,
        ui_origin: String,
    ) -> Self {
        Self {
            engine,
            ledger,
            host,
            oracle,
            ui_origin,
        }
    }

    /// Authenticate and dispatch one inbound message.
    ///
    /// The returned error is for the transport's bookkeeping only; it
    /// must never be relayed to the sender.
    pub async fn handle(&self, sender: &Sender, payload: serde_json::Value) -> Result<(), BridgeError> {
        let result = self.dispatch(sender, payload).await;
        if let Err(err) = &result {
            metrics::record_message_dropped(err.label());
            debug!(origin = %sender.origin, %err, "dropped inbound message");
        }
        result
    }

    async fn dispatch(&self, sender: &Sender, payload: serde_json::Value) -> Result<(), BridgeError> {
        match &sender.kind {
            SenderKind::Ui => {
                if sender.origin != self.ui_origin {
                    return Err(BridgeError::UnauthenticatedSender);
                }
                let request: UiRequest = serde_json::from_value(payload)
                    .map_err(|err| BridgeError::Malformed(err.to_string()))?;
                self.handle_ui(request).await
            }
            SenderKind::Page { tab } => {
                let tab = *tab;
                let message: ProbeMessage = serde_json::from_value(payload)
                    .map_err(|err| BridgeError::Malformed(err.to_string()))?;
                let ProbeMessage::PageIds {
                    canonical,
                    og_url,
                    json_ld_id,
                    nonce,
                } = message;

                self.ledger.verify(tab, nonce)?;

                // The tab's *current* origin must still hold tracking
                // permission, whatever was true when the probe was sent.
                let origin = self
                    .engine
                    .registry()
                    .peek(tab)
                    .and_then(|ctx| ctx.origin);
                let enabled = match &origin {
                    Some(origin) => self.oracle.is_enabled(origin).await,
                    None => false,
                };
                if !enabled {
                    return Err(BridgeError::TrackingDisabled);
                }

                self.engine
                    .on_probe_report(tab, canonical, og_url, json_ld_id)
                    .await;
                Ok(())
            }
        }
    }

    async fn handle_ui(&self, request: UiRequest) -> Result<(), BridgeError> {
        match request {
            UiRequest::GetState { tab } => {
                match self.resolve(tab).await {
                    Some(tab) => self.engine.broadcast(tab).await,
                    None => {
                        // Authenticated sender, nothing to show: answer
                        // with a no-data snapshot rather than silence.
                        let push = Outbound::UrlChangeState {
                            snapshot: TabSnapshot::empty(NO_TAB),
                        };
                        if let Err(err) = self.host.deliver_to_ui(push).await {
                            debug!(%err, "no-data snapshot delivery failed");
                        }
                    }
                }
                Ok(())
            }
            UiRequest::ManualReset { tab } => {
                if let Some(tab) = self.resolve(tab).await {
                    self.engine.manual_reset(tab).await;
                }
                Ok(())
            }
            UiRequest::SetTracking { origin, enabled } => {
                let parsed = Url::parse(&origin)
                    .ok()
                    .as_ref()
                    .and_then(Origin::of)
                    .ok_or_else(|| BridgeError::Malformed(format!("invalid origin: {origin}")))?;
                self.engine.set_tracking(&parsed, enabled).await;
                Ok(())
            }
        }
    }

    async fn resolve(&self, tab: Option<TabId>) -> Option<TabId> {
        match tab {
            Some(tab) => Some(tab),
            None => self.host.active_tab().await.unwrap_or(None),
        }
    }
}
