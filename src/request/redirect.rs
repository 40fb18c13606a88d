//! Redirect hop counting and target resolution.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LOCATION};
use url::Url;

/// Maximum number of redirects followed for one logical request.
pub const MAX_REDIRECTS: usize = 5;

/// Number of redirects already followed by a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedirectState {
    hops: usize,
}

impl RedirectState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn hops(self) -> usize {
        self.hops
    }

    /// State after one more hop, or `None` when the bound is already reached.
    #[must_use]
    pub fn follow(self) -> Option<Self> {
        (self.hops < MAX_REDIRECTS).then(|| Self {
            hops: self.hops + 1,
        })
    }
}

/// Statuses the dispatcher treats as redirects. Other 3xx answers are successes.
#[must_use]
pub fn is_followable_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND
    )
}

/// Resolves the `Location` header against the URL that produced it.
#[must_use]
pub fn redirect_target(current: &Url, headers: &HeaderMap) -> Option<Url> {
    let location = headers.get(LOCATION)?.to_str().ok()?.trim();
    if location.is_empty() {
        return None;
    }
    current.join(location).ok()
}
