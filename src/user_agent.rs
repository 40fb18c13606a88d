//! User-Agent string sent with every API request.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/osf-connection/osf-connection";

/// Default User-Agent for API and transfer requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("osf-connection/{version} (research-data-client; +{PROJECT_UA_URL})")
}
