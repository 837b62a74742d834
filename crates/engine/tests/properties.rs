use std::sync::Arc;
use std::time::Duration;

use browser_host::{BrowserHost, SimulatedHost};
use permissions_oracle::{GrantSource, HostGrantsOracle, PermissionsOracle};
use probe_bridge::NonceLedger;
use tabtally_core_types::{NavSource, Origin, TabId};
use tabtally_engine::{EngineConfig, TransitionEngine};
use tabtally_registry::TabRegistry;
use url::Url;

struct Fixture {
    host: Arc<SimulatedHost>,
    oracle: Arc<HostGrantsOracle>,
    ledger: Arc<NonceLedger>,
    engine: Arc<TransitionEngine>,
}

fn fixture() -> Fixture {
    let host = Arc::new(SimulatedHost::new());
    let oracle = Arc::new(HostGrantsOracle::new(
        Arc::clone(&host) as Arc<dyn GrantSource>
    ));
    let ledger = Arc::new(NonceLedger::new());
    let engine = TransitionEngine::new(
        Arc::new(TabRegistry::new()),
        Arc::clone(&oracle) as Arc<dyn PermissionsOracle>,
        Arc::clone(&host) as Arc<dyn BrowserHost>,
        Arc::clone(&ledger),
        EngineConfig {
            probe_debounce: Duration::from_millis(10),
            ..Default::default()
        },
    );
    Fixture {
        host,
        oracle,
        ledger,
        engine,
    }
}

fn parse(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

fn origin(raw: &str) -> Origin {
    Origin::of(&parse(raw)).unwrap()
}

/// Move the simulated tab and deliver the matching platform event.
async fn navigate(fix: &Fixture, tab: TabId, raw: &str, source: NavSource) {
    fix.host.navigate(tab, parse(raw));
    fix.engine.on_url_observed(tab, parse(raw), source).await;
}

#[tokio::test]
async fn first_observation_establishes_baseline_without_counting() {
    let fix = fixture();
    let tab = TabId(1);
    fix.host.seed_grant("https://news.example/*");
    fix.host.open_tab(tab, parse("https://news.example/a"));

    fix.engine
        .on_url_observed(tab, parse("https://news.example/a"), NavSource::Full)
        .await;

    let snap = fix.engine.snapshot(tab).await;
    assert!(snap.counters.is_zero());
    assert_eq!(snap.url.as_deref(), Some("https://news.example/a"));
    assert!(snap.tracking_enabled);
}

#[tokio::test]
async fn within_origin_transitions_accrue_and_stay_additive() {
    let fix = fixture();
    let tab = TabId(1);
    fix.host.seed_grant("https://news.example/*");
    fix.host.open_tab(tab, parse("https://news.example/a"));

    fix.engine
        .on_url_observed(tab, parse("https://news.example/a"), NavSource::Full)
        .await;
    navigate(&fix, tab, "https://news.example/b", NavSource::Full).await;
    navigate(&fix, tab, "https://news.example/b?ref=x", NavSource::Spa).await;

    let snap = fix.engine.snapshot(tab).await;
    assert_eq!(snap.counters.all, 2);
    assert_eq!(snap.counters.full, 1);
    assert_eq!(snap.counters.spa, 1);
    assert_eq!(snap.counters.all, snap.counters.full + snap.counters.spa);
    assert_eq!(snap.counters.path, 1);
    assert_eq!(snap.counters.query, 1);
    assert_eq!(snap.counters.fragment, 0);
    assert_eq!(fix.host.badge(tab), "2");
}

#[tokio::test]
async fn duplicate_observations_are_a_no_op() {
    let fix = fixture();
    let tab = TabId(2);
    fix.host.seed_grant("https://a.com/*");
    fix.host.open_tab(tab, parse("https://a.com/x"));

    fix.engine
        .on_url_observed(tab, parse("https://a.com/x"), NavSource::Full)
        .await;
    navigate(&fix, tab, "https://a.com/y", NavSource::Full).await;
    let before = fix.engine.snapshot(tab).await;

    // Redundant delivery of the same committed URL.
    fix.engine
        .on_url_observed(tab, parse("https://a.com/y"), NavSource::Full)
        .await;
    fix.engine
        .on_url_observed(tab, parse("https://a.com/y"), NavSource::Spa)
        .await;

    let after = fix.engine.snapshot(tab).await;
    assert_eq!(before.counters, after.counters);
}

#[tokio::test]
async fn origin_change_rebaselines_without_counting() {
    let fix = fixture();
    let tab = TabId(3);
    fix.host.seed_grant("https://a.com/*");
    fix.host.seed_grant("https://b.com/*");
    fix.host.open_tab(tab, parse("https://a.com/x"));

    fix.engine
        .on_url_observed(tab, parse("https://a.com/x"), NavSource::Full)
        .await;
    navigate(&fix, tab, "https://a.com/x2", NavSource::Full).await;
    assert_eq!(fix.engine.snapshot(tab).await.counters.all, 1);

    navigate(&fix, tab, "https://b.com/y", NavSource::Full).await;

    let snap = fix.engine.snapshot(tab).await;
    assert!(snap.counters.is_zero());
    assert_eq!(snap.origin.as_deref(), Some("https://b.com"));
    assert_eq!(snap.url.as_deref(), Some("https://b.com/y"));
    assert!(snap.identifiers.canonical.is_empty());
}

#[tokio::test]
async fn baseline_probe_results_never_increment_identifier_counters() {
    let fix = fixture();
    let tab = TabId(4);
    fix.host.seed_grant("https://a.com/*");
    fix.host.open_tab(tab, parse("https://a.com/x"));

    fix.engine
        .on_url_observed(tab, parse("https://a.com/x"), NavSource::Full)
        .await;

    // All three identifiers differ from the (empty) stored values, yet
    // the integration right after a baseline counts nothing.
    fix.engine
        .on_probe_report(
            tab,
            "https://a.com/c1".into(),
            "https://a.com/o1".into(),
            "id-1".into(),
        )
        .await;

    let snap = fix.engine.snapshot(tab).await;
    assert_eq!(snap.counters.canonical, 0);
    assert_eq!(snap.counters.og_url, 0);
    assert_eq!(snap.counters.json_ld_id, 0);
    assert_eq!(snap.identifiers.canonical, "https://a.com/c1");

    // The suppression flag is one-shot: the next genuine change counts.
    fix.engine
        .on_probe_report(
            tab,
            "https://a.com/c2".into(),
            "https://a.com/o2".into(),
            "id-2".into(),
        )
        .await;

    let snap = fix.engine.snapshot(tab).await;
    assert_eq!(snap.counters.canonical, 1);
    assert_eq!(snap.counters.og_url, 1);
    assert_eq!(snap.counters.json_ld_id, 1);
}

#[tokio::test]
async fn unchanged_identifier_values_do_not_count() {
    let fix = fixture();
    let tab = TabId(5);
    fix.host.seed_grant("https://a.com/*");
    fix.host.open_tab(tab, parse("https://a.com/x"));

    fix.engine
        .on_url_observed(tab, parse("https://a.com/x"), NavSource::Full)
        .await;
    fix.engine
        .on_probe_report(tab, "https://a.com/c1".into(), String::new(), String::new())
        .await;
    fix.engine
        .on_probe_report(tab, "https://a.com/c1".into(), String::new(), String::new())
        .await;

    let snap = fix.engine.snapshot(tab).await;
    assert_eq!(snap.counters.canonical, 0);
    assert_eq!(snap.identifiers.canonical, "https://a.com/c1");
}

#[tokio::test]
async fn disabled_tracking_is_inert_but_shows_location() {
    let fix = fixture();
    let tab = TabId(6);
    fix.host.open_tab(tab, parse("https://quiet.example/a"));

    fix.engine
        .on_url_observed(tab, parse("https://quiet.example/a"), NavSource::Full)
        .await;
    navigate(&fix, tab, "https://quiet.example/b", NavSource::Full).await;
    fix.engine
        .on_probe_report(tab, "https://quiet.example/c".into(), String::new(), String::new())
        .await;

    let snap = fix.engine.snapshot(tab).await;
    assert!(snap.counters.is_zero());
    assert!(!snap.tracking_enabled);
    assert_eq!(snap.url.as_deref(), Some("https://quiet.example/b"));
    assert_eq!(fix.host.badge(tab), "");
    // Disabled means no probe traffic at all.
    assert_eq!(fix.host.injection_count(tab), 0);
}

#[tokio::test]
async fn disabling_mid_session_freezes_counters() {
    let fix = fixture();
    let tab = TabId(7);
    fix.host.seed_grant("https://news.example/*");
    fix.host.open_tab(tab, parse("https://news.example/a"));

    fix.engine
        .on_url_observed(tab, parse("https://news.example/a"), NavSource::Full)
        .await;
    navigate(&fix, tab, "https://news.example/b", NavSource::Full).await;
    assert_eq!(fix.engine.snapshot(tab).await.counters.all, 1);

    fix.oracle
        .set_enabled(&origin("https://news.example/"), false)
        .await
        .unwrap();

    navigate(&fix, tab, "https://news.example/c", NavSource::Full).await;

    let snap = fix.engine.snapshot(tab).await;
    assert_eq!(snap.counters.all, 1);
    assert!(!snap.tracking_enabled);
    assert_eq!(snap.url.as_deref(), Some("https://news.example/c"));
}

#[tokio::test]
async fn manual_reset_rebaselines_and_suppresses_the_next_probe() {
    let fix = fixture();
    let tab = TabId(8);
    fix.host.seed_grant("https://news.example/*");
    fix.host.open_tab(tab, parse("https://news.example/a"));

    fix.engine
        .on_url_observed(tab, parse("https://news.example/a"), NavSource::Full)
        .await;
    fix.engine
        .on_probe_report(tab, "https://news.example/c1".into(), String::new(), String::new())
        .await;
    navigate(&fix, tab, "https://news.example/z", NavSource::Full).await;
    assert_eq!(fix.engine.snapshot(tab).await.counters.all, 1);

    fix.engine.manual_reset(tab).await;

    let snap = fix.engine.snapshot(tab).await;
    assert!(snap.counters.is_zero());
    assert_eq!(snap.url.as_deref(), Some("https://news.example/z"));

    // Canonical differs from what was stored before the reset cleared it;
    // the post-reset probe still must not count.
    fix.engine
        .on_probe_report(tab, "https://news.example/c2".into(), String::new(), String::new())
        .await;
    assert_eq!(fix.engine.snapshot(tab).await.counters.canonical, 0);
}

#[tokio::test]
async fn probe_result_from_a_previous_origin_is_discarded() {
    let fix = fixture();
    let tab = TabId(9);
    fix.host.seed_grant("https://a.com/*");
    fix.host.open_tab(tab, parse("https://a.com/x"));

    // Baseline dispatches an immediate probe; its pending record carries
    // a.com.
    fix.engine
        .on_url_observed(tab, parse("https://a.com/x"), NavSource::Full)
        .await;
    assert_eq!(fix.host.injection_count(tab), 1);

    // The tab moves to an untracked origin before the result arrives.
    navigate(&fix, tab, "https://elsewhere.example/y", NavSource::Full).await;

    fix.engine
        .on_probe_report(tab, "https://a.com/c1".into(), String::new(), String::new())
        .await;

    let snap = fix.engine.snapshot(tab).await;
    assert!(snap.identifiers.canonical.is_empty());
    assert!(snap.counters.is_zero());
}

#[tokio::test]
async fn full_navigation_rotates_the_probe_nonce() {
    let fix = fixture();
    let tab = TabId(10);
    fix.host.seed_grant("https://a.com/*");
    fix.host.open_tab(tab, parse("https://a.com/x"));

    fix.engine
        .on_url_observed(tab, parse("https://a.com/x"), NavSource::Full)
        .await;
    assert!(fix.ledger.is_injected(tab));
    assert_eq!(fix.host.injection_count(tab), 1);

    navigate(&fix, tab, "https://a.com/y", NavSource::Full).await;
    // The new document invalidated the injection; the debounced probe
    // re-injects with a fresh token.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(fix.host.injection_count(tab), 2);
}

#[tokio::test]
async fn spa_navigation_keeps_the_injection() {
    let fix = fixture();
    let tab = TabId(11);
    fix.host.seed_grant("https://a.com/*");
    fix.host.open_tab(tab, parse("https://a.com/x"));

    fix.engine
        .on_url_observed(tab, parse("https://a.com/x"), NavSource::Full)
        .await;
    navigate(&fix, tab, "https://a.com/x#section", NavSource::Spa).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    // Same document, same probe: no re-injection.
    assert_eq!(fix.host.injection_count(tab), 1);
}

#[tokio::test]
async fn closed_tabs_leave_nothing_behind() {
    let fix = fixture();
    let tab = TabId(12);
    fix.host.seed_grant("https://a.com/*");
    fix.host.open_tab(tab, parse("https://a.com/x"));

    fix.engine
        .on_url_observed(tab, parse("https://a.com/x"), NavSource::Full)
        .await;
    fix.engine.on_load_complete(tab).await;

    fix.host.close_tab(tab);
    fix.engine.on_tab_closed(tab).await;

    assert!(fix.engine.registry().is_empty());
    assert!(!fix.ledger.is_injected(tab));
    // The pending debounce timer was cancelled with the tab.
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(fix.host.injection_count(tab), 0);
}

#[tokio::test]
async fn unsupported_schemes_are_ignored() {
    let fix = fixture();
    let tab = TabId(13);
    fix.host.open_tab(tab, parse("https://a.com/x"));

    fix.engine
        .on_url_observed(tab, parse("about:blank"), NavSource::Full)
        .await;
    fix.engine
        .on_url_observed(tab, parse("ftp://a.com/f"), NavSource::Full)
        .await;

    assert!(fix.engine.registry().is_empty());
}

#[tokio::test]
async fn grant_refusal_reports_disabled_to_the_ui() {
    let fix = fixture();
    let tab = TabId(14);
    fix.host.open_tab(tab, parse("https://a.com/x"));
    fix.host.refuse_grant_requests(true);

    fix.engine
        .set_tracking(&origin("https://a.com/"), true)
        .await;

    let messages = fix.host.ui_messages();
    let result = messages
        .iter()
        .find_map(|message| match message {
            probe_bridge::Outbound::SetTrackingResult {
                enabled, reason, ..
            } => Some((*enabled, reason.clone())),
            _ => None,
        })
        .expect("set-tracking result delivered");
    assert!(!result.0);
    assert!(result.1.is_some());
}

#[tokio::test]
async fn enabling_tracking_rebaselines_the_active_tab() {
    let fix = fixture();
    let tab = TabId(15);
    fix.host.open_tab(tab, parse("https://news.example/a"));

    // Passive observation while disabled.
    fix.engine
        .on_url_observed(tab, parse("https://news.example/a"), NavSource::Full)
        .await;
    assert!(!fix.engine.snapshot(tab).await.tracking_enabled);

    fix.engine
        .set_tracking(&origin("https://news.example/"), true)
        .await;

    let snap = fix.engine.snapshot(tab).await;
    assert!(snap.tracking_enabled);
    assert!(snap.counters.is_zero());

    // Counting works from the fresh baseline.
    navigate(&fix, tab, "https://news.example/b", NavSource::Full).await;
    assert_eq!(fix.engine.snapshot(tab).await.counters.all, 1);
}
