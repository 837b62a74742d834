use lazy_static::lazy_static;
use prometheus::{core::Collector, IntGauge, Registry};
use tracing::error;

lazy_static! {
    static ref REGISTRY_TABS_TOTAL: IntGauge =
        IntGauge::new("tally_registry_tabs_total", "Tracked tab contexts").unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register registry metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, REGISTRY_TABS_TOTAL.clone());
}

pub fn set_tab_count(count: usize) {
    REGISTRY_TABS_TOTAL.set(count as i64);
}
