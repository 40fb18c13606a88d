//! Error type delivered to request continuations.
//!
//! Every variant carries the URL or path it concerns. There is no blanket
//! `From<reqwest::Error>` or `From<std::io::Error>`: the constructor helpers
//! attach that context instead.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::redirect::MAX_REDIRECTS;

/// Errors that can end a request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The URL could not be parsed. A programming error; never retried.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL string.
        url: String,
    },

    /// The network was reported unreachable; no request was issued.
    #[error("no network access")]
    Offline,

    /// DNS, connection, TLS or body transport failure.
    #[error("network error requesting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server did not answer in time.
    #[error("timeout requesting {url}")]
    Timeout { url: String },

    /// The server answered with a 4xx/5xx status.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus { url: String, status: u16 },

    /// HTTP 401 for a request that cannot be replayed after re-authentication.
    #[error("authentication required for {url}")]
    Unauthorized { url: String },

    /// The redirect bound was exceeded.
    #[error("too many redirects requesting {url} (limit {limit})")]
    TooManyRedirects { url: String, limit: usize },

    /// Only GET requests follow redirects.
    #[error("HTTP {status} redirect for {method} {url} was not followed")]
    RedirectNotFollowed {
        url: String,
        method: String,
        status: u16,
    },

    /// A 301/302 answer without a usable `Location` header.
    #[error("HTTP {status} redirect from {url} has no usable Location header")]
    MissingRedirectTarget { url: String, status: u16 },

    /// File system error while staging a transfer.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a valid destination", path.display())]
    InvalidDestination { path: PathBuf },

    #[error("{} is not a valid source file", path.display())]
    InvalidSource { path: PathBuf },

    /// A reader-backed upload source was already streamed by an earlier attempt.
    #[error("upload source for {url} was already consumed")]
    SourceConsumed { url: String },

    /// The existing destination file could not be removed.
    #[error("Could not replace {}", path.display())]
    DestinationNotReplaceable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The staged download could not be moved onto the destination.
    #[error("Could not save file to {}", path.display())]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The response body is not the expected JSON document.
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The caller's abort handle fired.
    #[error("request to {url} was cancelled")]
    Cancelled { url: String },

    /// The request was parked for replay, but a different user logged in.
    #[error("request to {url} was discarded after the session changed")]
    Discarded { url: String },
}

impl RequestError {
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Maps a reqwest transport error to [`Self::Timeout`] or [`Self::Network`].
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn unauthorized(url: impl Into<String>) -> Self {
        Self::Unauthorized { url: url.into() }
    }

    pub fn too_many_redirects(url: impl Into<String>) -> Self {
        Self::TooManyRedirects {
            url: url.into(),
            limit: MAX_REDIRECTS,
        }
    }

    pub fn redirect_not_followed(
        url: impl Into<String>,
        method: impl Into<String>,
        status: u16,
    ) -> Self {
        Self::RedirectNotFollowed {
            url: url.into(),
            method: method.into(),
            status,
        }
    }

    pub fn missing_redirect_target(url: impl Into<String>, status: u16) -> Self {
        Self::MissingRedirectTarget {
            url: url.into(),
            status,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_destination(path: impl AsRef<Path>) -> Self {
        Self::InvalidDestination {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn invalid_source(path: impl AsRef<Path>) -> Self {
        Self::InvalidSource {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn source_consumed(url: impl Into<String>) -> Self {
        Self::SourceConsumed { url: url.into() }
    }

    pub fn destination_not_replaceable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DestinationNotReplaceable {
            path: path.into(),
            source,
        }
    }

    pub fn save_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SaveFailed {
            path: path.into(),
            source,
        }
    }

    pub fn decode(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    pub fn discarded(url: impl Into<String>) -> Self {
        Self::Discarded { url: url.into() }
    }

    /// True when the caller aborted the request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// HTTP status for status errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    /// Title of the error notification for this failure.
    #[must_use]
    pub fn notification_title(&self) -> String {
        match self {
            Self::HttpStatus { status, .. } => status.to_string(),
            Self::Unauthorized { .. } => "401".to_string(),
            Self::Offline => "No network access".to_string(),
            Self::Network { .. } => "Network error".to_string(),
            Self::Timeout { .. } => "Timeout".to_string(),
            Self::TooManyRedirects { .. } => "Whoops, something is going wrong".to_string(),
            Self::RedirectNotFollowed { .. } | Self::MissingRedirectTarget { .. } => {
                "Redirect error".to_string()
            }
            Self::DestinationNotReplaceable { .. } | Self::SaveFailed { .. } => {
                "Error saving file".to_string()
            }
            Self::Io { .. }
            | Self::InvalidDestination { .. }
            | Self::InvalidSource { .. }
            | Self::SourceConsumed { .. } => "File error".to_string(),
            Self::Decode { .. } => "Invalid response".to_string(),
            Self::InvalidUrl { .. } | Self::Cancelled { .. } | Self::Discarded { .. } => {
                "Request failed".to_string()
            }
        }
    }

    /// Message of the error notification for this failure.
    #[must_use]
    pub fn notification_message(&self) -> String {
        match self {
            Self::TooManyRedirects { .. } => "Too many redirects".to_string(),
            Self::Offline => {
                "Your network connection is down or you currently have no Internet access."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display_and_title() {
        let error = RequestError::http_status("https://api.osf.io/v2/nodes/x/", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("https://api.osf.io/v2/nodes/x/"));
        assert_eq!(error.notification_title(), "404");
        assert_eq!(error.status(), Some(404));
    }

    #[test]
    fn test_too_many_redirects_notification() {
        let error = RequestError::too_many_redirects("https://example.com/loop");
        assert_eq!(
            error.notification_title(),
            "Whoops, something is going wrong"
        );
        assert_eq!(error.notification_message(), "Too many redirects");
        assert!(error.to_string().contains(&MAX_REDIRECTS.to_string()));
    }

    #[test]
    fn test_destination_messages() {
        let error = RequestError::invalid_destination("/no/such/dir/file.txt");
        assert_eq!(
            error.to_string(),
            "/no/such/dir/file.txt is not a valid destination"
        );

        let error = RequestError::destination_not_replaceable(
            "/tmp/out.bin",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(error.to_string(), "Could not replace /tmp/out.bin");
        assert_eq!(error.notification_title(), "Error saving file");
    }

    #[test]
    fn test_invalid_source_message() {
        let error = RequestError::invalid_source("/missing.csv");
        assert_eq!(error.to_string(), "/missing.csv is not a valid source file");
    }

    #[test]
    fn test_cancelled_is_recognised() {
        assert!(RequestError::cancelled("https://example.com").is_cancelled());
        assert!(!RequestError::timeout("https://example.com").is_cancelled());
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error as _;

        let error = RequestError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(error.source().is_some());
        assert!(error.to_string().contains("/tmp/x"));
    }
}
