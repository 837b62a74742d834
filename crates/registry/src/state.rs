use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tabtally_core_types::TabId;

use crate::metrics;
use crate::model::TabCtx;

/// In-memory arena of per-tab contexts, keyed by platform tab id.
///
/// Entries are created lazily on first reference and removed when the
/// owning tab closes. The registry hands out `Arc<RwLock<TabCtx>>` cells;
/// all mutation is funneled through the transition engine, which keeps
/// write locks short and never holds one across an await.
pub struct TabRegistry {
    tabs: DashMap<TabId, Arc<RwLock<TabCtx>>>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self {
            tabs: DashMap::new(),
        }
    }

    /// Existing context for `tab`, or a freshly zeroed one.
    pub fn ensure(&self, tab: TabId) -> Arc<RwLock<TabCtx>> {
        let entry = self
            .tabs
            .entry(tab)
            .or_insert_with(|| Arc::new(RwLock::new(TabCtx::new(tab))));
        let ctx = Arc::clone(entry.value());
        drop(entry);
        metrics::set_tab_count(self.tabs.len());
        ctx
    }

    pub fn get(&self, tab: TabId) -> Option<Arc<RwLock<TabCtx>>> {
        self.tabs.get(&tab).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop the context for a closed tab. No-op for unknown tabs.
    pub fn remove(&self, tab: TabId) {
        self.tabs.remove(&tab);
        metrics::set_tab_count(self.tabs.len());
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Cloned context value, for snapshot assembly.
    pub fn peek(&self, tab: TabId) -> Option<TabCtx> {
        self.get(tab).map(|cell| cell.read().clone())
    }
}

impl Default for TabRegistry {
    fn default() -> Self {
        Self::new()
    }
}
