//! Per-origin tracking permission oracle.
//!
//! The single source of truth for "is tracking enabled for this origin".
//! Two variants exist: [`HostGrantsOracle`] reads the platform's live
//! permission grants through a [`GrantSource`] on every query, so a grant
//! revoked through any path is reflected on the next call; and
//! [`AllowListOracle`] keeps a user-managed origin set persisted as a
//! plain JSON map. Neither variant caches an answer anywhere a stale copy
//! could survive.

mod store;

pub use store::AllowListOracle;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

use tabtally_core_types::Origin;

/// Errors surfaced by oracle mutation paths. Queries are infallible by
/// contract: any failure resolves to "disabled".
#[derive(Clone, Debug, Error)]
pub enum OracleError {
    #[error("grant transport failure: {0}")]
    Transport(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Event emitted whenever the effective tracking state of an origin is
/// toggled through the oracle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionChange {
    pub origin: String,
    pub enabled: bool,
    pub reason: Option<String>,
    pub timestamp: SystemTime,
}

/// Platform grant surface: single-host wildcard patterns in, booleans out.
/// `request` returns false when the user refuses the grant dialog.
#[async_trait]
pub trait GrantSource: Send + Sync {
    async fn contains(&self, pattern: &str) -> Result<bool, OracleError>;
    async fn request(&self, pattern: &str) -> Result<bool, OracleError>;
    async fn remove(&self, pattern: &str) -> Result<bool, OracleError>;
}

/// The oracle surface consumed by the transition engine and the router.
#[async_trait]
pub trait PermissionsOracle: Send + Sync {
    /// Whether tracking is enabled for `origin` right now. Infallible:
    /// transport failures degrade to `false`, the conservative state.
    async fn is_enabled(&self, origin: &Origin) -> bool;

    /// Enable or disable tracking for `origin`. Returns the effective
    /// state afterwards; a user refusing the grant dialog is `Ok(false)`,
    /// not an error.
    async fn set_enabled(&self, origin: &Origin, enabled: bool) -> Result<bool, OracleError>;

    fn subscribe(&self) -> broadcast::Receiver<PermissionChange>;
}

/// Read-through oracle over the platform's live grant set. Holds no state
/// of its own beyond the event channel.
pub struct HostGrantsOracle {
    source: Arc<dyn GrantSource>,
    events: broadcast::Sender<PermissionChange>,
}

impl HostGrantsOracle {
    pub fn new(source: Arc<dyn GrantSource>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { source, events }
    }
}

pub(crate) fn publish_change(
    events: &broadcast::Sender<PermissionChange>,
    origin: &Origin,
    enabled: bool,
    reason: Option<String>,
) {
    let change = PermissionChange {
        origin: origin.to_string(),
        enabled,
        reason,
        timestamp: SystemTime::now(),
    };
    // Send fails only when no receiver is subscribed; that is fine.
    let _ = events.send(change);
}

#[async_trait]
impl PermissionsOracle for HostGrantsOracle {
    async fn is_enabled(&self, origin: &Origin) -> bool {
        match self.source.contains(&origin.match_pattern()).await {
            Ok(granted) => granted,
            Err(err) => {
                warn!(origin = %origin, %err, "grant lookup failed, treating as disabled");
                false
            }
        }
    }

    async fn set_enabled(&self, origin: &Origin, enabled: bool) -> Result<bool, OracleError> {
        let pattern = origin.match_pattern();
        let effective = if enabled {
            self.source.request(&pattern).await?
        } else {
            self.source.remove(&pattern).await?;
            false
        };
        let reason = (enabled && !effective).then(|| "grant refused".to_string());
        publish_change(&self.events, origin, effective, reason);
        Ok(effective)
    }

    fn subscribe(&self) -> broadcast::Receiver<PermissionChange> {
        self.events.subscribe()
    }
}
