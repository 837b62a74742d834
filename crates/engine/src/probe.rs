//! Metadata probe coordination.
//!
//! Debounces probe requests per tab, ensures the in-page extractor is
//! injected and holds a fresh capability token before asking it for
//! identifiers, and folds results back into tab state under the
//! permission/baseline/suppression gates.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use browser_host::BrowserHost;
use permissions_oracle::PermissionsOracle;
use probe_bridge::{NonceLedger, Outbound};
use tabtally_core_types::{Origin, TabId};
use tabtally_debounce::DebounceMap;
use tabtally_registry::TabRegistry;
use tabtally_url_classifier as classifier;

use crate::metrics;

pub struct ProbeCoordinator {
    registry: Arc<TabRegistry>,
    oracle: Arc<dyn PermissionsOracle>,
    host: Arc<dyn BrowserHost>,
    ledger: Arc<NonceLedger>,
    timers: DebounceMap<TabId>,
    /// Origin the oracle approved when each in-flight probe was sent;
    /// a result integrating against a different origin is stale.
    pending: DashMap<TabId, Origin>,
}

impl ProbeCoordinator {
    pub fn new(
        registry: Arc<TabRegistry>,
        oracle: Arc<dyn PermissionsOracle>,
        host: Arc<dyn BrowserHost>,
        ledger: Arc<NonceLedger>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            oracle,
            host,
            ledger,
            timers: DebounceMap::new(),
            pending: DashMap::new(),
        })
    }

    /// Debounced probe request: repeated calls within the window collapse
    /// into a single dispatch.
    pub fn schedule(self: &Arc<Self>, tab: TabId, delay: Duration) {
        let coordinator = Arc::clone(self);
        self.timers.schedule(tab, delay, async move {
            coordinator.dispatch(tab).await;
        });
    }

    /// Send a probe request right now, bypassing the debounce window.
    /// Every precondition is re-checked here: the tab may have navigated
    /// or lost its grant since the request was scheduled.
    pub async fn dispatch(&self, tab: TabId) {
        let Some(ctx) = self.registry.peek(tab) else {
            return;
        };
        let (Some(url), Some(origin)) = (ctx.last_url, ctx.origin) else {
            return;
        };
        if !classifier::probe_capable(&url) {
            return;
        }
        if !self.oracle.is_enabled(&origin).await {
            return;
        }

        self.pending.insert(tab, origin);

        if !self.ledger.is_injected(tab) {
            if let Err(err) = self.host.inject_probe(tab).await {
                debug!(%tab, %err, "probe injection failed");
                self.pending.remove(&tab);
                return;
            }
            let nonce = self.ledger.issue(tab);
            if let Err(err) = self
                .host
                .deliver_to_tab(tab, Outbound::InitProbe { nonce })
                .await
            {
                debug!(%tab, %err, "nonce handoff failed");
                self.ledger.forget(tab);
                self.pending.remove(&tab);
                return;
            }
        }

        if let Err(err) = self.host.deliver_to_tab(tab, Outbound::ProbeIds).await {
            debug!(%tab, %err, "probe request failed");
            self.pending.remove(&tab);
            return;
        }
        metrics::record_probe_dispatched();
    }

    /// Fold an authenticated probe result into tab state. Returns whether
    /// any stored identifier changed (a signal to rebroadcast).
    ///
    /// Counters move only when tracking is enabled for the tab's current
    /// origin, a baseline exists, and the one-shot suppression flag is not
    /// armed; the flag is consumed either way. A result whose dispatch
    /// origin no longer matches the tab is discarded without consuming
    /// anything.
    pub async fn integrate(
        &self,
        tab: TabId,
        canonical: String,
        og_url: String,
        json_ld_id: String,
    ) -> bool {
        let Some(cell) = self.registry.get(tab) else {
            return false;
        };

        let dispatch_origin = self.pending.remove(&tab).map(|(_, origin)| origin);
        let current_origin = cell.read().origin.clone();

        if let Some(dispatched) = &dispatch_origin {
            if current_origin.as_ref() != Some(dispatched) {
                metrics::record_probe_stale();
                debug!(%tab, "discarding probe result from a previous origin");
                return false;
            }
        }

        let enabled = match &current_origin {
            Some(origin) => self.oracle.is_enabled(origin).await,
            None => false,
        };

        let mut changed = false;
        {
            let mut ctx = cell.write();
            // The oracle call suspended; the tab may have moved meanwhile.
            if ctx.origin != current_origin {
                metrics::record_probe_stale();
                return false;
            }

            let suppressed = ctx.probe_phase.consume();
            let countable = enabled && ctx.has_baseline && !suppressed;

            if !canonical.is_empty() && canonical != ctx.identifiers.canonical {
                ctx.identifiers.canonical = canonical;
                if countable {
                    ctx.counters.canonical += 1;
                }
                changed = true;
            }
            if !og_url.is_empty() && og_url != ctx.identifiers.og_url {
                ctx.identifiers.og_url = og_url;
                if countable {
                    ctx.counters.og_url += 1;
                }
                changed = true;
            }
            if !json_ld_id.is_empty() && json_ld_id != ctx.identifiers.json_ld_id {
                ctx.identifiers.json_ld_id = json_ld_id;
                if countable {
                    ctx.counters.json_ld_id += 1;
                }
                changed = true;
            }
        }

        if changed {
            metrics::record_probe_integrated();
        }
        changed
    }

    /// Invalidate the tab's injection record so the next dispatch
    /// re-injects and rotates the nonce. Called on every new document.
    pub fn invalidate(&self, tab: TabId) {
        self.ledger.forget(tab);
    }

    /// Full cleanup for a closed tab: timer, pending record, nonce.
    pub fn forget(&self, tab: TabId) {
        self.timers.cancel(&tab);
        self.pending.remove(&tab);
        self.ledger.forget(tab);
    }
}
