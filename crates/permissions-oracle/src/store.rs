//! Persisted allow-list variant of the oracle.
//!
//! The on-disk format is an opaque JSON map of origin string to `true`,
//! read once at startup and rewritten wholesale on every toggle. The
//! in-memory set is the store; the file is a write-behind copy that is
//! never consulted after load.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::warn;

use tabtally_core_types::Origin;

use crate::{publish_change, OracleError, PermissionChange, PermissionsOracle};

pub struct AllowListOracle {
    path: Option<PathBuf>,
    origins: Arc<RwLock<HashSet<String>>>,
    events: broadcast::Sender<PermissionChange>,
}

impl AllowListOracle {
    /// Ephemeral list, no persistence. Used in tests and replay mode.
    pub fn in_memory() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            path: None,
            origins: Arc::new(RwLock::new(HashSet::new())),
            events,
        }
    }

    /// Load the allow-list from `path`. A missing file is an empty list,
    /// not an error; a corrupt file is.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OracleError> {
        let path = path.as_ref().to_path_buf();
        let origins = if path.exists() {
            let file = File::open(&path)
                .map_err(|err| OracleError::Persistence(format!("open {path:?}: {err}")))?;
            let map: BTreeMap<String, bool> = serde_json::from_reader(file)
                .map_err(|err| OracleError::Persistence(format!("parse {path:?}: {err}")))?;
            map.into_iter()
                .filter_map(|(origin, enabled)| enabled.then_some(origin))
                .collect()
        } else {
            HashSet::new()
        };

        let (events, _) = broadcast::channel(64);
        Ok(Self {
            path: Some(path),
            origins: Arc::new(RwLock::new(origins)),
            events,
        })
    }

    fn persist(&self, origins: &HashSet<String>) -> Result<(), OracleError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let map: BTreeMap<&String, bool> = origins.iter().map(|origin| (origin, true)).collect();
        let file = File::create(path)
            .map_err(|err| OracleError::Persistence(format!("create {path:?}: {err}")))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &map)
            .map_err(|err| OracleError::Persistence(format!("write {path:?}: {err}")))?;
        Ok(())
    }
}

#[async_trait]
impl PermissionsOracle for AllowListOracle {
    async fn is_enabled(&self, origin: &Origin) -> bool {
        self.origins.read().contains(&origin.to_string())
    }

    async fn set_enabled(&self, origin: &Origin, enabled: bool) -> Result<bool, OracleError> {
        let key = origin.to_string();
        let snapshot = {
            let mut guard = self.origins.write();
            if enabled {
                guard.insert(key.clone());
            } else {
                guard.remove(&key);
            }
            guard.clone()
        };

        if let Err(err) = self.persist(&snapshot) {
            if enabled {
                // An origin that cannot be recorded must not count as
                // enabled: revert so the in-memory answer stays honest.
                self.origins.write().remove(&key);
                return Err(err);
            }
            // Disabling stays disabled in memory even if the file write
            // failed; the conservative state wins.
            warn!(origin = %origin, %err, "allow-list persist failed on disable");
        }

        publish_change(&self.events, origin, enabled, None);
        Ok(enabled)
    }

    fn subscribe(&self) -> broadcast::Receiver<PermissionChange> {
        self.events.subscribe()
    }
}
