//! Scripted replay of platform-event traces against a simulated host.
//!
//! This is how the coordinator is exercised end-to-end without a browser:
//! a trace file drives tab events, UI requests, and probe replies through
//! the same paths a live add-on would use, and every UI push the
//! coordinator makes comes back out in order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use browser_host::{BrowserHost, SimulatedHost};
use permissions_oracle::{
    AllowListOracle, HostGrantsOracle, OracleError, PermissionsOracle,
};
use probe_bridge::{NonceLedger, Outbound, Sender, SenderKind, UiRequest};
use tabtally_core_types::{Origin, TabId};
use tabtally_engine::TransitionEngine;
use tabtally_registry::TabRegistry;
use url::Url;

use crate::config::{ConfigError, OracleKind, TallyConfig};
use crate::coordinator::Coordinator;
use crate::events::PlatformEvent;
use crate::router::MessageRouter;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// One step of a replay trace.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum TraceStep {
    /// Seed a host grant as if the user had approved it earlier.
    Grant { pattern: String },
    /// Deliver a platform event.
    Platform { event: PlatformEvent },
    /// Deliver a UI request through the messaging boundary.
    Ui { request: UiRequest },
    /// Have the simulated page answer the outstanding probe, echoing the
    /// capability token it was handed.
    ProbeReply {
        tab: TabId,
        #[serde(default)]
        canonical: String,
        #[serde(default)]
        og_url: String,
        #[serde(default)]
        json_ld_id: String,
    },
    /// Let debounce timers run ("50ms", "1s", ...).
    Wait { duration: String },
}

/// Wire a coordinator around a fresh [`SimulatedHost`] per the config.
pub fn build_simulated(
    config: &TallyConfig,
) -> Result<(Coordinator, Arc<SimulatedHost>), SetupError> {
    let host = Arc::new(SimulatedHost::new());
    let oracle: Arc<dyn PermissionsOracle> = match config.oracle {
        OracleKind::Grants => Arc::new(HostGrantsOracle::new(Arc::clone(&host) as _)),
        OracleKind::Allowlist => match &config.allowlist_path {
            Some(path) => Arc::new(AllowListOracle::load(path)?),
            None => Arc::new(AllowListOracle::in_memory()),
        },
    };
    let ledger = Arc::new(NonceLedger::new());
    let engine = TransitionEngine::new(
        Arc::new(TabRegistry::new()),
        Arc::clone(&oracle),
        Arc::clone(&host) as Arc<dyn BrowserHost>,
        Arc::clone(&ledger),
        config.engine_config()?,
    );
    let router = MessageRouter::new(
        Arc::clone(&engine),
        ledger,
        Arc::clone(&host) as Arc<dyn BrowserHost>,
        oracle,
        config.ui_origin.clone(),
    );
    Ok((Coordinator::new(engine, router), host))
}

/// Run a trace to completion, returning every UI push in delivery order.
pub async fn run(
    coordinator: &Coordinator,
    host: &Arc<SimulatedHost>,
    ui_origin: &str,
    steps: Vec<TraceStep>,
) -> Vec<Outbound> {
    let mut collected = Vec::new();

    for step in steps {
        match step {
            TraceStep::Grant { pattern } => host.seed_grant(pattern),
            TraceStep::Platform { event } => {
                mirror_host_state(host, &event);
                coordinator.handle_event(event).await;
            }
            TraceStep::Ui { request } => {
                let sender = Sender {
                    kind: SenderKind::Ui,
                    origin: ui_origin.to_string(),
                };
                if let Ok(payload) = serde_json::to_value(&request) {
                    let _ = coordinator.router().handle(&sender, payload).await;
                }
            }
            TraceStep::ProbeReply {
                tab,
                canonical,
                og_url,
                json_ld_id,
            } => {
                let Some(nonce) = last_issued_nonce(host, tab) else {
                    continue;
                };
                let origin = host
                    .live_tab_url(tab)
                    .await
                    .ok()
                    .flatten()
                    .as_ref()
                    .and_then(Origin::of)
                    .map(|origin| origin.to_string())
                    .unwrap_or_default();
                let sender = Sender {
                    kind: SenderKind::Page { tab },
                    origin,
                };
                let payload = json!({
                    "type": "page-ids",
                    "canonical": canonical,
                    "ogUrl": og_url,
                    "jsonLdId": json_ld_id,
                    "nonce": nonce.0,
                });
                let _ = coordinator.router().handle(&sender, payload).await;
            }
            TraceStep::Wait { duration } => {
                if let Ok(delay) = humantime::parse_duration(&duration) {
                    tokio::time::sleep(delay).await;
                }
            }
        }
        collected.extend(host.drain_ui_messages());
    }

    collected
}

/// Keep the simulated live-tab view in sync with the event stream, the
/// way the real browser's state precedes its notifications.
fn mirror_host_state(host: &SimulatedHost, event: &PlatformEvent) {
    match event {
        // A subframe navigation never moves the tab's own address.
        PlatformEvent::NavigationCommitted {
            main_frame: false, ..
        }
        | PlatformEvent::SameDocumentCommitted {
            main_frame: false, ..
        } => {}
        PlatformEvent::TabUrlUpdated { tab, url }
        | PlatformEvent::NavigationCommitted { tab, url, .. }
        | PlatformEvent::SameDocumentCommitted { tab, url, .. } => {
            if let Ok(parsed) = Url::parse(url) {
                host.open_tab(*tab, parsed);
            }
        }
        PlatformEvent::TabClosed { tab } => host.close_tab(*tab),
        PlatformEvent::TabActivated { tab } => host.focus(*tab),
        PlatformEvent::TabLoadComplete { .. } => {}
    }
}

fn last_issued_nonce(host: &SimulatedHost, tab: TabId) -> Option<probe_bridge::ProbeNonce> {
    host.tab_messages(tab)
        .iter()
        .rev()
        .find_map(|message| match message {
            Outbound::InitProbe { nonce } => Some(*nonce),
            _ => None,
        })
}
