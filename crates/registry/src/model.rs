use std::time::Instant;

use tabtally_core_types::{NavCounters, Origin, PageIdentifiers, TabId};
use url::Url;

/// One-shot suppression state for the probe cycle that follows a baseline.
///
/// Armed on every baseline establishment; the next metadata integration
/// consumes it exactly once, whether or not any identifier actually
/// differed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProbePhase {
    #[default]
    Idle,
    AwaitingBaselineProbe,
}

impl ProbePhase {
    /// Return to `Idle`, reporting whether suppression was armed.
    pub fn consume(&mut self) -> bool {
        let armed = matches!(self, Self::AwaitingBaselineProbe);
        *self = Self::Idle;
        armed
    }
}

/// Per-tab navigation/metadata context.
///
/// Mutated only by the transition engine and the metadata integrator;
/// `origin` is always derived from `last_url` and the two never diverge.
#[derive(Clone, Debug)]
pub struct TabCtx {
    pub tab: TabId,
    pub last_url: Option<Url>,
    pub origin: Option<Origin>,
    pub has_baseline: bool,
    pub probe_phase: ProbePhase,
    pub counters: NavCounters,
    pub identifiers: PageIdentifiers,
    pub touched_at: Instant,
}

impl TabCtx {
    pub fn new(tab: TabId) -> Self {
        Self {
            tab,
            last_url: None,
            origin: None,
            has_baseline: false,
            probe_phase: ProbePhase::Idle,
            counters: NavCounters::default(),
            identifiers: PageIdentifiers::default(),
            touched_at: Instant::now(),
        }
    }

    /// Establish a fresh baseline at `url`: counters and identifiers
    /// zeroed, suppression armed for the immediate follow-up probe.
    pub fn rebaseline(&mut self, url: Url) {
        self.origin = Origin::of(&url);
        self.last_url = Some(url);
        self.has_baseline = true;
        self.probe_phase = ProbePhase::AwaitingBaselineProbe;
        self.counters = NavCounters::default();
        self.identifiers = PageIdentifiers::default();
        self.touched_at = Instant::now();
    }

    /// Advance the position without touching counters or identifiers
    /// (within-origin transition, or passive location update while
    /// tracking is off).
    pub fn advance(&mut self, url: Url) {
        self.origin = Origin::of(&url);
        self.last_url = Some(url);
        self.has_baseline = true;
        self.touched_at = Instant::now();
    }

    /// Drop everything back to the no-data state.
    pub fn clear(&mut self) {
        self.last_url = None;
        self.origin = None;
        self.has_baseline = false;
        self.probe_phase = ProbePhase::Idle;
        self.counters = NavCounters::default();
        self.identifiers = PageIdentifiers::default();
        self.touched_at = Instant::now();
    }
}
