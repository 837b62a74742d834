use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Platform tab identifier, as assigned by the host browser.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TabId(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab:{}", self.0)
    }
}

/// How a URL change reached the coordinator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavSource {
    /// A new document load.
    Full,
    /// A same-document history-API mutation.
    Spa,
}

impl NavSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Spa => "spa",
        }
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        _ => None,
    }
}

/// Scheme + host (+ explicit non-default port) slice of a URL.
///
/// The unit at which tracking permission and baselines are scoped. Default
/// ports are normalized away so `http://a.com` and `http://a.com:80` compare
/// equal.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    /// Derive the origin of `url`. `None` for opaque URLs without a host,
    /// except `file:` which maps to a hostless origin of its own.
    pub fn of(url: &Url) -> Option<Self> {
        let scheme = url.scheme().to_ascii_lowercase();
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None if scheme == "file" => String::new(),
            None => return None,
        };
        let port = url.port().filter(|p| Some(*p) != default_port(&scheme));
        Some(Self { scheme, host, port })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Single-host wildcard pattern used for platform grant queries,
    /// e.g. `https://news.example/*`.
    pub fn match_pattern(&self) -> String {
        format!("{}/*", self)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// Which URL components differ between two observations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UrlDelta {
    pub origin_changed: bool,
    pub path_changed: bool,
    pub query_changed: bool,
    pub fragment_changed: bool,
}

/// Aggregate counters for one tab's observation window.
///
/// `all == full + spa` holds at all times: the totals move only through
/// [`NavCounters::record_transition`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct NavCounters {
    pub all: u64,
    pub full: u64,
    pub spa: u64,
    pub path: u64,
    pub query: u64,
    pub fragment: u64,
    pub canonical: u64,
    pub og_url: u64,
    pub json_ld_id: u64,
}

impl NavCounters {
    /// Accrue one within-origin transition.
    pub fn record_transition(&mut self, source: NavSource, delta: &UrlDelta) {
        self.all += 1;
        match source {
            NavSource::Full => self.full += 1,
            NavSource::Spa => self.spa += 1,
        }
        if delta.path_changed {
            self.path += 1;
        }
        if delta.query_changed {
            self.query += 1;
        }
        if delta.fragment_changed {
            self.fragment += 1;
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Last-seen page identifier values. Empty string means "not observed".
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PageIdentifiers {
    pub canonical: String,
    pub og_url: String,
    pub json_ld_id: String,
}

/// Observable state pushed to UI listeners whenever a tab's tally changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabSnapshot {
    pub tab: TabId,
    pub url: Option<String>,
    pub origin: Option<String>,
    pub tracking_enabled: bool,
    pub counters: NavCounters,
    pub identifiers: PageIdentifiers,
}

impl TabSnapshot {
    /// Snapshot for a tab the coordinator has no data for.
    pub fn empty(tab: TabId) -> Self {
        Self {
            tab,
            url: None,
            origin: None,
            tracking_enabled: false,
            counters: NavCounters::default(),
            identifiers: PageIdentifiers::default(),
        }
    }
}
