use lazy_static::lazy_static;
use prometheus::{core::Collector, opts, IntCounter, IntCounterVec, Registry};
use tracing::error;

lazy_static! {
    static ref ENGINE_TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!(
            "tally_engine_transitions_total",
            "Within-origin transitions counted, grouped by source"
        ),
        &["source"]
    )
    .unwrap();
    static ref ENGINE_REBASELINES_TOTAL: IntCounter = IntCounter::new(
        "tally_engine_rebaselines_total",
        "Baseline establishments (first observation, origin change, focus, reset)",
    )
    .unwrap();
    static ref ENGINE_PROBES_DISPATCHED: IntCounter = IntCounter::new(
        "tally_engine_probes_dispatched_total",
        "Identifier probes dispatched to pages",
    )
    .unwrap();
    static ref ENGINE_PROBES_INTEGRATED: IntCounter = IntCounter::new(
        "tally_engine_probes_integrated_total",
        "Probe results folded into tab state",
    )
    .unwrap();
    static ref ENGINE_PROBES_STALE: IntCounter = IntCounter::new(
        "tally_engine_probes_stale_total",
        "Probe results discarded because the tab origin moved on",
    )
    .unwrap();
    static ref ENGINE_MESSAGES_DROPPED: IntCounterVec = IntCounterVec::new(
        opts!(
            "tally_engine_messages_dropped_total",
            "Inbound messages dropped at the boundary, grouped by reason"
        ),
        &["reason"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register engine metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, ENGINE_TRANSITIONS_TOTAL.clone());
    register(registry, ENGINE_REBASELINES_TOTAL.clone());
    register(registry, ENGINE_PROBES_DISPATCHED.clone());
    register(registry, ENGINE_PROBES_INTEGRATED.clone());
    register(registry, ENGINE_PROBES_STALE.clone());
    register(registry, ENGINE_MESSAGES_DROPPED.clone());
}

pub fn record_transition(source: &str) {
    ENGINE_TRANSITIONS_TOTAL.with_label_values(&[source]).inc();
}

pub fn record_rebaseline() {
    ENGINE_REBASELINES_TOTAL.inc();
}

pub fn record_probe_dispatched() {
    ENGINE_PROBES_DISPATCHED.inc();
}

pub fn record_probe_integrated() {
    ENGINE_PROBES_INTEGRATED.inc();
}

pub fn record_probe_stale() {
    ENGINE_PROBES_STALE.inc();
}

pub fn record_message_dropped(reason: &str) {
    ENGINE_MESSAGES_DROPPED.with_label_values(&[reason]).inc();
}
