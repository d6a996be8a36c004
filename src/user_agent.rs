//! Shared User-Agent strings for transfer and metadata HTTP clients.

/// Project URL advertised in the User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/fierce/mediarelay";

/// User-Agent for source downloads and sink uploads.
#[must_use]
pub(crate) fn default_transfer_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("mediarelay/{version} (transfer; +{PROJECT_UA_URL})")
}

/// User-Agent for metadata endpoint lookups.
#[must_use]
pub(crate) fn default_metadata_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("mediarelay/{version} (metadata; +{PROJECT_UA_URL})")
}
