//! URL delta classification.
//!
//! Pure functions over parsed URLs: which of origin/path/query/fragment
//! differ between the prior baseline and the next observation, plus the
//! supported-scheme policy. Malformed URLs never reach this crate; the
//! coordinator parses (and rejects) upstream.

use tabtally_core_types::{Origin, UrlDelta};
use url::Url;

/// Schemes the coordinator observes at all. `file` is supported so local
/// pages can be tallied, but it is never probe-capable.
const SUPPORTED_SCHEMES: [&str; 3] = ["http", "https", "file"];

/// Whether the coordinator should react to this URL at all.
pub fn is_supported(url: &Url) -> bool {
    SUPPORTED_SCHEMES
        .iter()
        .any(|s| url.scheme().eq_ignore_ascii_case(s))
}

/// Whether an in-page identifier probe may run against this URL.
pub fn probe_capable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Compare `next` against the prior baseline. All fields are false when
/// there is no baseline yet.
pub fn classify(prev: Option<&Url>, next: &Url) -> UrlDelta {
    let Some(prev) = prev else {
        return UrlDelta::default();
    };

    UrlDelta {
        origin_changed: Origin::of(prev) != Origin::of(next),
        path_changed: prev.path() != next.path(),
        query_changed: prev.query() != next.query(),
        fragment_changed: prev.fragment() != next.fragment(),
    }
}
