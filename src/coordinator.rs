//! Platform-event dispatch into the engine.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use tabtally_core_types::NavSource;
use tabtally_engine::TransitionEngine;

use crate::events::PlatformEvent;
use crate::router::MessageRouter;

/// The background coordinator: one engine, one message router, and the
/// event fan-in that connects the platform to them.
pub struct Coordinator {
    engine: Arc<TransitionEngine>,
    router: MessageRouter,
}

impl Coordinator {
    pub fn new(engine: Arc<TransitionEngine>, router: MessageRouter) -> Self {
        Self { engine, router }
    }

    pub fn engine(&self) -> &Arc<TransitionEngine> {
        &self.engine
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub async fn handle_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::TabUrlUpdated { tab, url } => {
                if let Some(url) = parse_url(&url) {
                    self.engine.on_url_observed(tab, url, NavSource::Full).await;
                }
            }
            PlatformEvent::NavigationCommitted {
                tab,
                url,
                main_frame,
            } => {
                if !main_frame {
                    return;
                }
                if let Some(url) = parse_url(&url) {
                    self.engine.on_url_observed(tab, url, NavSource::Full).await;
                }
            }
            PlatformEvent::SameDocumentCommitted {
                tab,
                url,
                main_frame,
            } => {
                if !main_frame {
                    return;
                }
                if let Some(url) = parse_url(&url) {
                    self.engine.on_url_observed(tab, url, NavSource::Spa).await;
                }
            }
            PlatformEvent::TabLoadComplete { tab } => {
                self.engine.on_load_complete(tab).await;
            }
            PlatformEvent::TabActivated { tab } => {
                self.engine.on_tab_activated(tab).await;
            }
            PlatformEvent::TabClosed { tab } => {
                self.engine.on_tab_closed(tab).await;
            }
        }
    }
}

fn parse_url(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(err) => {
            debug!(%raw, %err, "ignoring malformed URL from platform event");
            None
        }
    }
}
