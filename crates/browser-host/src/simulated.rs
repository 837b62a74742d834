//! In-memory host used by the replay CLI and the test suites.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use url::Url;

use permissions_oracle::{GrantSource, OracleError};
use probe_bridge::Outbound;
use tabtally_core_types::TabId;

use crate::{BrowserHost, HostError};

/// Scripted stand-in for the browser: a tab map, a grant set, a badge
/// map, and outboxes recording every delivered message. Implements both
/// [`BrowserHost`] and [`GrantSource`] so one fake drives both seams.
pub struct SimulatedHost {
    tabs: DashMap<TabId, Url>,
    active: Mutex<Option<TabId>>,
    grants: Mutex<HashSet<String>>,
    refuse_grants: AtomicBool,
    injections: DashMap<TabId, u32>,
    badges: DashMap<TabId, String>,
    ui_outbox: Mutex<Vec<Outbound>>,
    tab_outbox: Mutex<Vec<(TabId, Outbound)>>,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self {
            tabs: DashMap::new(),
            active: Mutex::new(None),
            grants: Mutex::new(HashSet::new()),
            refuse_grants: AtomicBool::new(false),
            injections: DashMap::new(),
            badges: DashMap::new(),
            ui_outbox: Mutex::new(Vec::new()),
            tab_outbox: Mutex::new(Vec::new()),
        }
    }

    // ---- scripting surface ------------------------------------------------

    pub fn open_tab(&self, tab: TabId, url: Url) {
        self.tabs.insert(tab, url);
        let mut active = self.active.lock();
        if active.is_none() {
            *active = Some(tab);
        }
    }

    pub fn navigate(&self, tab: TabId, url: Url) {
        self.tabs.insert(tab, url);
    }

    pub fn close_tab(&self, tab: TabId) {
        self.tabs.remove(&tab);
        self.injections.remove(&tab);
        self.badges.remove(&tab);
        let mut active = self.active.lock();
        if *active == Some(tab) {
            *active = None;
        }
    }

    pub fn focus(&self, tab: TabId) {
        *self.active.lock() = Some(tab);
    }

    /// Pre-seed a grant, bypassing the request dialog.
    pub fn seed_grant(&self, pattern: impl Into<String>) {
        self.grants.lock().insert(pattern.into());
    }

    /// Make subsequent grant requests behave as if the user refused.
    pub fn refuse_grant_requests(&self, refuse: bool) {
        self.refuse_grants.store(refuse, Ordering::SeqCst);
    }

    // ---- inspection surface ----------------------------------------------

    pub fn injection_count(&self, tab: TabId) -> u32 {
        self.injections.get(&tab).map(|e| *e.value()).unwrap_or(0)
    }

    pub fn badge(&self, tab: TabId) -> String {
        self.badges
            .get(&tab)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn ui_messages(&self) -> Vec<Outbound> {
        self.ui_outbox.lock().clone()
    }

    pub fn tab_messages(&self, tab: TabId) -> Vec<Outbound> {
        self.tab_outbox
            .lock()
            .iter()
            .filter(|(id, _)| *id == tab)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn drain_ui_messages(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.ui_outbox.lock())
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserHost for SimulatedHost {
    async fn live_tab_url(&self, tab: TabId) -> Result<Option<Url>, HostError> {
        Ok(self.tabs.get(&tab).map(|entry| entry.value().clone()))
    }

    async fn active_tab(&self) -> Result<Option<TabId>, HostError> {
        Ok(*self.active.lock())
    }

    async fn inject_probe(&self, tab: TabId) -> Result<(), HostError> {
        if !self.tabs.contains_key(&tab) {
            return Err(HostError::NoSuchTab(tab));
        }
        *self.injections.entry(tab).or_insert(0) += 1;
        Ok(())
    }

    async fn deliver_to_tab(&self, tab: TabId, message: Outbound) -> Result<(), HostError> {
        if !self.tabs.contains_key(&tab) {
            return Err(HostError::NoSuchTab(tab));
        }
        self.tab_outbox.lock().push((tab, message));
        Ok(())
    }

    async fn deliver_to_ui(&self, message: Outbound) -> Result<(), HostError> {
        self.ui_outbox.lock().push(message);
        Ok(())
    }

    async fn set_badge_text(&self, tab: TabId, text: &str) -> Result<(), HostError> {
        self.badges.insert(tab, text.to_string());
        Ok(())
    }
}

#[async_trait]
impl GrantSource for SimulatedHost {
    async fn contains(&self, pattern: &str) -> Result<bool, OracleError> {
        Ok(self.grants.lock().contains(pattern))
    }

    async fn request(&self, pattern: &str) -> Result<bool, OracleError> {
        if self.refuse_grants.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.grants.lock().insert(pattern.to_string());
        Ok(true)
    }

    async fn remove(&self, pattern: &str) -> Result<bool, OracleError> {
        Ok(self.grants.lock().remove(pattern))
    }
}
