//! The baseline/transition state machine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

use browser_host::BrowserHost;
use permissions_oracle::PermissionsOracle;
use probe_bridge::{NonceLedger, Outbound};
use tabtally_core_types::{NavSource, Origin, TabId, TabSnapshot};
use tabtally_registry::TabRegistry;
use tabtally_url_classifier as classifier;

use crate::metrics;
use crate::probe::ProbeCoordinator;
use crate::snapshot;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Debounce window for URL-change and load-complete probes.
    pub probe_debounce: Duration,
    /// Whether to paint the toolbar badge at all.
    pub badge_enabled: bool,
    /// Capacity of the in-process snapshot broadcast channel.
    pub bus_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_debounce: Duration::from_millis(350),
            badge_enabled: true,
            bus_capacity: 64,
        }
    }
}

/// Outcome of classifying one observation under the tab's write lock.
enum Step {
    Baseline,
    Counted,
    Dedup,
}

/// The per-tab navigation/metadata state machine.
///
/// All state mutation funnels through here (and through the probe
/// coordinator it owns). Handlers never propagate platform failures:
/// every error path degrades to "no visible change".
pub struct TransitionEngine {
    registry: Arc<TabRegistry>,
    oracle: Arc<dyn PermissionsOracle>,
    host: Arc<dyn BrowserHost>,
    probes: Arc<ProbeCoordinator>,
    events: broadcast::Sender<TabSnapshot>,
    config: EngineConfig,
}

impl TransitionEngine {
    pub fn new(
        registry: Arc<TabRegistry>,
        oracle: Arc<dyn PermissionsOracle>,
        host: Arc<dyn BrowserHost>,
        ledger: Arc<NonceLedger>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let probes = ProbeCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&oracle),
            Arc::clone(&host),
            ledger,
        );
        let (events, _) = broadcast::channel(config.bus_capacity.max(1));
        Arc::new(Self {
            registry,
            oracle,
            host,
            probes,
            events,
            config,
        })
    }

    /// In-process snapshot stream (the UI push goes through the host).
    pub fn subscribe(&self) -> broadcast::Receiver<TabSnapshot> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &Arc<TabRegistry> {
        &self.registry
    }

    /// Single entry point for every observed URL change.
    pub async fn on_url_observed(&self, tab: TabId, url: Url, source: NavSource) {
        if !classifier::is_supported(&url) {
            return;
        }
        let Some(origin) = Origin::of(&url) else {
            return;
        };

        let enabled = self.oracle.is_enabled(&origin).await;
        let cell = self.registry.ensure(tab);

        if !enabled {
            // Disabled tracking stays fully inert except for passive
            // location display: no counters, no probes.
            cell.write().advance(url);
            self.broadcast(tab).await;
            return;
        }

        let step = {
            let mut ctx = cell.write();
            if !ctx.has_baseline {
                Step::Baseline
            } else if ctx.last_url.as_ref() == Some(&url) {
                // Platform events fire redundantly; identical URLs are
                // a no-op.
                Step::Dedup
            } else {
                let delta = classifier::classify(ctx.last_url.as_ref(), &url);
                if delta.origin_changed {
                    Step::Baseline
                } else {
                    ctx.counters.record_transition(source, &delta);
                    ctx.advance(url.clone());
                    Step::Counted
                }
            }
        };

        match step {
            Step::Dedup => {}
            Step::Baseline => self.establish_baseline(tab).await,
            Step::Counted => {
                metrics::record_transition(source.as_str());
                if source == NavSource::Full {
                    // A new document destroyed the old probe; rotate the
                    // token on the next injection.
                    self.probes.invalidate(tab);
                }
                self.broadcast(tab).await;
                self.probes.schedule(tab, self.config.probe_debounce);
            }
        }
    }

    /// Establish a baseline from the tab's *live* URL — not whatever URL
    /// the triggering event carried, which may already be outdated.
    pub async fn establish_baseline(&self, tab: TabId) {
        metrics::record_rebaseline();

        let live = match self.host.live_tab_url(tab).await {
            Ok(url) => url,
            Err(err) => {
                debug!(%tab, %err, "live URL lookup failed during baseline");
                None
            }
        };
        let cell = self.registry.ensure(tab);

        let live = live.filter(classifier::is_supported);
        let Some(url) = live else {
            cell.write().clear();
            self.probes.forget(tab);
            self.broadcast(tab).await;
            return;
        };
        let Some(origin) = Origin::of(&url) else {
            cell.write().clear();
            self.probes.forget(tab);
            self.broadcast(tab).await;
            return;
        };

        if !self.oracle.is_enabled(&origin).await {
            cell.write().advance(url);
            self.broadcast(tab).await;
            return;
        }

        cell.write().rebaseline(url.clone());
        self.probes.invalidate(tab);
        self.broadcast(tab).await;

        if classifier::probe_capable(&url) {
            // Immediate probe so the UI gets baseline metadata without a
            // visible delay; its result is suppressed from counting.
            self.probes.dispatch(tab).await;
        }
    }

    /// User-initiated reset: force a fresh baseline wherever the tab is.
    pub async fn manual_reset(&self, tab: TabId) {
        self.establish_baseline(tab).await;
    }

    pub async fn on_load_complete(&self, tab: TabId) {
        self.probes.schedule(tab, self.config.probe_debounce);
    }

    pub async fn on_tab_activated(&self, tab: TabId) {
        let live = match self.host.live_tab_url(tab).await {
            Ok(url) => url.filter(classifier::is_supported),
            Err(err) => {
                debug!(%tab, %err, "live URL lookup failed on activation");
                None
            }
        };
        let Some(url) = live else {
            return;
        };
        let Some(origin) = Origin::of(&url) else {
            return;
        };

        if self.oracle.is_enabled(&origin).await {
            self.establish_baseline(tab).await;
        } else {
            self.registry.ensure(tab).write().advance(url);
            self.broadcast(tab).await;
        }
    }

    pub async fn on_tab_closed(&self, tab: TabId) {
        self.registry.remove(tab);
        self.probes.forget(tab);
    }

    /// Grant or revoke tracking for an origin and report the outcome to
    /// the UI. On success for the active tab's origin, counting restarts
    /// from a fresh baseline.
    pub async fn set_tracking(&self, origin: &Origin, enabled: bool) {
        let (effective, reason) = match self.oracle.set_enabled(origin, enabled).await {
            Ok(effective) => {
                let reason = (enabled && !effective).then(|| "grant refused".to_string());
                (effective, reason)
            }
            Err(err) => {
                warn!(%origin, %err, "set-tracking failed");
                (false, Some(err.to_string()))
            }
        };

        let result = Outbound::SetTrackingResult {
            origin: origin.to_string(),
            enabled: effective,
            reason,
        };
        if let Err(err) = self.host.deliver_to_ui(result).await {
            debug!(%err, "set-tracking result delivery failed");
        }

        let active = self.host.active_tab().await.unwrap_or(None);
        let Some(tab) = active else {
            return;
        };
        let live_origin = self
            .host
            .live_tab_url(tab)
            .await
            .unwrap_or(None)
            .as_ref()
            .and_then(Origin::of);
        if live_origin.as_ref() == Some(origin) {
            if effective {
                self.establish_baseline(tab).await;
            } else {
                self.broadcast(tab).await;
            }
        }
    }

    /// Fold an authenticated probe result into state and rebroadcast when
    /// anything changed.
    pub async fn on_probe_report(
        &self,
        tab: TabId,
        canonical: String,
        og_url: String,
        json_ld_id: String,
    ) {
        let changed = self
            .probes
            .integrate(tab, canonical, og_url, json_ld_id)
            .await;
        if changed {
            self.broadcast(tab).await;
        }
    }

    /// Observable state for a tab, falling back to the platform's live
    /// URL when the registry has nothing yet.
    pub async fn snapshot(&self, tab: TabId) -> TabSnapshot {
        match self.registry.peek(tab) {
            Some(ctx) => {
                let enabled = match &ctx.origin {
                    Some(origin) => self.oracle.is_enabled(origin).await,
                    None => false,
                };
                snapshot::assemble(&ctx, enabled)
            }
            None => {
                let live = self
                    .host
                    .live_tab_url(tab)
                    .await
                    .unwrap_or(None)
                    .filter(classifier::is_supported);
                let enabled = match live.as_ref().and_then(Origin::of) {
                    Some(origin) => self.oracle.is_enabled(&origin).await,
                    None => false,
                };
                snapshot::assemble_live(tab, live.as_ref(), enabled)
            }
        }
    }

    /// Push the tab's snapshot to every listener and repaint the badge.
    /// Delivery failures are swallowed; there is nobody to surface them
    /// to.
    pub async fn broadcast(&self, tab: TabId) {
        let snap = self.snapshot(tab).await;

        let _ = self.events.send(snap.clone());
        if let Err(err) = self
            .host
            .deliver_to_ui(Outbound::UrlChangeState {
                snapshot: snap.clone(),
            })
            .await
        {
            debug!(%tab, %err, "snapshot delivery failed");
        }

        if self.config.badge_enabled {
            let text = snapshot::badge_text(&snap);
            if let Err(err) = self.host.set_badge_text(tab, &text).await {
                debug!(%tab, %err, "badge update failed");
            }
        }
    }
}
