//! The messaging boundary's data plane.
//!
//! Two disjoint inbound message families cross into the coordinator: UI
//! requests, authenticated by sender origin, and in-page probe reports,
//! authenticated by injection record plus a per-tab capability token
//! ([`ProbeNonce`]). This crate owns the wire shapes for both families,
//! all outbound pushes, and the [`NonceLedger`] that issues and checks
//! the tokens. Authentication *decisions* live in the router; the types
//! and the ledger here make them mechanical.

use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use tabtally_core_types::{TabId, TabSnapshot};

/// Capability token authenticating probe reports for one tab.
///
/// Issued at injection time, held only by the coordinator and the freshly
/// injected probe, regenerated on every (re-)injection. Never persisted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ProbeNonce(pub Uuid);

impl ProbeNonce {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProbeNonce {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProbeNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who a message claims to come from, as attached by the transport layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SenderKind {
    /// The add-on's own UI surface.
    Ui,
    /// A content probe running inside a tab.
    Page { tab: TabId },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sender {
    pub kind: SenderKind,
    /// Origin string of the sending context, as reported by the platform.
    pub origin: String,
}

/// Requests accepted from the UI surface.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiRequest {
    /// Snapshot request; no tab means "the active tab".
    GetState { tab: Option<TabId> },
    /// Forced re-baseline; no tab means "the active tab".
    ManualReset { tab: Option<TabId> },
    /// Grant or revoke tracking for an origin.
    SetTracking { origin: String, enabled: bool },
}

/// Messages accepted from an injected page probe.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProbeMessage {
    #[serde(rename_all = "camelCase")]
    PageIds {
        #[serde(default)]
        canonical: String,
        #[serde(default)]
        og_url: String,
        #[serde(default)]
        json_ld_id: String,
        nonce: ProbeNonce,
    },
}

/// Everything the coordinator pushes out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Outbound {
    /// Capability-token handoff to a freshly injected probe.
    InitProbe { nonce: ProbeNonce },
    /// Ask the probe to extract page identifiers.
    ProbeIds,
    /// Snapshot push to UI listeners.
    UrlChangeState { snapshot: TabSnapshot },
    /// Outcome of a set-tracking request.
    SetTrackingResult {
        origin: String,
        enabled: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Reasons an inbound message is dropped. None of these surface to the
/// sender: an unauthenticated peer gets silence, not an error shape.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BridgeError {
    #[error("sender is not the extension UI")]
    UnauthenticatedSender,
    #[error("tab was never injected")]
    NeverInjected,
    #[error("nonce does not match the last issued value")]
    StaleNonce,
    #[error("tracking disabled for the tab's origin")]
    TrackingDisabled,
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl BridgeError {
    /// Stable label for drop metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnauthenticatedSender => "unauthenticated",
            Self::NeverInjected => "never_injected",
            Self::StaleNonce => "stale_nonce",
            Self::TrackingDisabled => "tracking_disabled",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Per-tab token issuance and verification.
///
/// A ledger entry doubles as the injection record: a tab with no entry
/// has never received a probe, so nothing it sends can authenticate.
pub struct NonceLedger {
    nonces: DashMap<TabId, ProbeNonce>,
}

impl NonceLedger {
    pub fn new() -> Self {
        Self {
            nonces: DashMap::new(),
        }
    }

    /// Mint a fresh token for `tab`, superseding any previous one.
    pub fn issue(&self, tab: TabId) -> ProbeNonce {
        let nonce = ProbeNonce::new();
        self.nonces.insert(tab, nonce);
        nonce
    }

    pub fn is_injected(&self, tab: TabId) -> bool {
        self.nonces.contains_key(&tab)
    }

    /// Check a presented token against the last issued one.
    pub fn verify(&self, tab: TabId, presented: ProbeNonce) -> Result<(), BridgeError> {
        match self.nonces.get(&tab) {
            None => Err(BridgeError::NeverInjected),
            Some(current) if *current.value() == presented => Ok(()),
            Some(_) => Err(BridgeError::StaleNonce),
        }
    }

    /// Forget the tab entirely (tab closed).
    pub fn forget(&self, tab: TabId) {
        self.nonces.remove(&tab);
    }
}

impl Default for NonceLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ui_request_wire_names() {
        let raw = json!({"type": "get-state", "tab": 4});
        let parsed: UiRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(
            parsed,
            UiRequest::GetState {
                tab: Some(TabId(4))
            }
        );

        let raw = json!({"type": "set-tracking", "origin": "https://a.com", "enabled": true});
        let parsed: UiRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(
            parsed,
            UiRequest::SetTracking {
                origin: "https://a.com".into(),
                enabled: true
            }
        );
    }

    #[test]
    fn page_ids_wire_shape_defaults_missing_fields() {
        let nonce = ProbeNonce::new();
        let raw = json!({"type": "page-ids", "canonical": "https://a.com/c", "nonce": nonce.0});
        let ProbeMessage::PageIds {
            canonical,
            og_url,
            json_ld_id,
            nonce: presented,
        } = serde_json::from_value(raw).unwrap();
        assert_eq!(canonical, "https://a.com/c");
        assert!(og_url.is_empty());
        assert!(json_ld_id.is_empty());
        assert_eq!(presented, nonce);
    }

    #[test]
    fn outbound_state_push_uses_the_documented_tag() {
        let message = Outbound::UrlChangeState {
            snapshot: TabSnapshot::empty(TabId(1)),
        };
        let raw = serde_json::to_value(&message).unwrap();
        assert_eq!(raw["type"], "url-change-state");
    }

    #[test]
    fn ledger_rotates_on_reissue() {
        let ledger = NonceLedger::new();
        let tab = TabId(9);
        assert!(!ledger.is_injected(tab));
        assert_eq!(
            ledger.verify(tab, ProbeNonce::new()),
            Err(BridgeError::NeverInjected)
        );

        let first = ledger.issue(tab);
        assert!(ledger.verify(tab, first).is_ok());

        let second = ledger.issue(tab);
        assert_eq!(ledger.verify(tab, first), Err(BridgeError::StaleNonce));
        assert!(ledger.verify(tab, second).is_ok());

        ledger.forget(tab);
        assert_eq!(
            ledger.verify(tab, second),
            Err(BridgeError::NeverInjected)
        );
    }
}
