//! Inbound platform events, as delivered by the host browser's tab and
//! navigation APIs.

use serde::{Deserialize, Serialize};
use tabtally_core_types::TabId;

fn main_frame_default() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PlatformEvent {
    /// The tab's address changed (tabs API).
    TabUrlUpdated { tab: TabId, url: String },
    /// The tab finished loading its document.
    TabLoadComplete { tab: TabId },
    /// A full navigation committed (new document).
    NavigationCommitted {
        tab: TabId,
        url: String,
        #[serde(default = "main_frame_default")]
        main_frame: bool,
    },
    /// A same-document history-API navigation committed.
    SameDocumentCommitted {
        tab: TabId,
        url: String,
        #[serde(default = "main_frame_default")]
        main_frame: bool,
    },
    TabClosed { tab: TabId },
    TabActivated { tab: TabId },
}
