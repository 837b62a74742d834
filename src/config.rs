//! Coordinator configuration.
//!
//! Loaded once at startup from JSON or YAML (both are accepted; JSON is
//! tried first). Every field has a sensible default so an empty file is a
//! valid configuration.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tabtally_engine::EngineConfig;

/// Which permission oracle variant backs "is tracking enabled".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    /// Read the platform's live host-permission grants (canonical).
    Grants,
    /// Keep a persisted per-origin allow-list.
    Allowlist,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Debounce window for metadata probes ("350ms", "1s", ...).
    pub probe_debounce: String,
    /// Paint the toolbar badge with the running tally.
    pub badge: bool,
    pub oracle: OracleKind,
    /// Allow-list file; only read for `oracle = "allowlist"`. Absent
    /// means an ephemeral in-memory list.
    pub allowlist_path: Option<PathBuf>,
    /// Origin of the add-on's own UI surface; the only sender whose UI
    /// requests are accepted.
    pub ui_origin: String,
    /// Capacity of the in-process snapshot broadcast channel.
    pub bus_capacity: usize,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            probe_debounce: "350ms".to_string(),
            badge: true,
            oracle: OracleKind::Grants,
            allowlist_path: None,
            ui_origin: "extension://tabtally".to_string(),
            bus_capacity: 64,
        }
    }
}

/// Errors surfaced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize config: {0}")]
    Deserialize(String),
    #[error("invalid duration '{value}': {detail}")]
    InvalidDuration { value: String, detail: String },
}

impl TallyConfig {
    pub fn probe_debounce(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.probe_debounce).map_err(|err| {
            ConfigError::InvalidDuration {
                value: self.probe_debounce.clone(),
                detail: err.to_string(),
            }
        })
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        Ok(EngineConfig {
            probe_debounce: self.probe_debounce()?,
            badge_enabled: self.badge,
            bus_capacity: self.bus_capacity,
        })
    }
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<TallyConfig, ConfigError> {
    let mut file = File::open(path.as_ref())?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    parse_str(&buf)
}

pub fn parse_str(raw: &str) -> Result<TallyConfig, ConfigError> {
    match serde_json::from_str(raw) {
        Ok(config) => Ok(config),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            ConfigError::Deserialize(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TallyConfig::default();
        assert_eq!(
            config.probe_debounce().unwrap(),
            Duration::from_millis(350)
        );
        assert!(config.engine_config().is_ok());
    }

    #[test]
    fn yaml_and_json_both_parse() {
        let json = parse_str(r#"{"probe_debounce": "1s", "oracle": "allowlist"}"#).unwrap();
        assert_eq!(json.oracle, OracleKind::Allowlist);
        assert_eq!(json.probe_debounce().unwrap(), Duration::from_secs(1));

        let yaml = parse_str("badge: false\nui_origin: extension://abc\n").unwrap();
        assert!(!yaml.badge);
        assert_eq!(yaml.ui_origin, "extension://abc");
    }

    #[test]
    fn bad_duration_is_reported() {
        let config = parse_str(r#"{"probe_debounce": "soon"}"#).unwrap();
        assert!(matches!(
            config.probe_debounce(),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }
}
