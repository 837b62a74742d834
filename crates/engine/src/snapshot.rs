//! Snapshot assembly and badge rendering.

use tabtally_core_types::{Origin, TabId, TabSnapshot};
use tabtally_registry::TabCtx;
use url::Url;

/// Snapshot for a tab the registry knows about.
pub fn assemble(ctx: &TabCtx, tracking_enabled: bool) -> TabSnapshot {
    TabSnapshot {
        tab: ctx.tab,
        url: ctx.last_url.as_ref().map(|url| url.to_string()),
        origin: ctx.origin.as_ref().map(|origin| origin.to_string()),
        tracking_enabled,
        counters: ctx.counters,
        identifiers: ctx.identifiers.clone(),
    }
}

/// Snapshot for a tab the coordinator has never observed: only the live
/// URL is known, counters are zero.
pub fn assemble_live(tab: TabId, url: Option<&Url>, tracking_enabled: bool) -> TabSnapshot {
    TabSnapshot {
        url: url.map(|u| u.to_string()),
        origin: url.and_then(Origin::of).map(|o| o.to_string()),
        tracking_enabled,
        ..TabSnapshot::empty(tab)
    }
}

/// Toolbar badge text for a snapshot. Empty when tracking is off or the
/// tally is zero; saturates at four glyphs.
pub fn badge_text(snapshot: &TabSnapshot) -> String {
    if !snapshot.tracking_enabled || snapshot.counters.all == 0 {
        return String::new();
    }
    if snapshot.counters.all > 999 {
        return "999+".to_string();
    }
    snapshot.counters.all.to_string()
}
