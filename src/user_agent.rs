//! Shared User-Agent string for cookie-replay fetch traffic.
//!
//! Single source for project URL and UA format so replayed requests stay
//! consistent and easy to update (good citizenship; RFC 9308).

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/docharvest";

/// Default User-Agent for replayed document requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("docharvest/{version} (archive-tool; +{PROJECT_UA_URL})")
}
