//! Connection settings and their defaults.

use std::path::PathBuf;

use crate::auth::{OAuthConfig, TokenError, default_token_path};

/// Default connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default read timeout in seconds (per read, large transfers stay alive).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Public OSF API v2 endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.osf.io/v2/";

/// Everything a [`ConnectionManager`](crate::ConnectionManager) needs to know
/// about the remote service and local persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub token_path: PathBuf,
    pub oauth: OAuthConfig,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl ClientConfig {
    /// Default OSF settings with the token stored at `token_path`.
    pub fn new(token_path: impl Into<PathBuf>) -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_path: token_path.into(),
            oauth: OAuthConfig::default(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }

    /// Default OSF settings with the token at the per-user config location.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::ConfigDirUnavailable`] if no usable config dir is found.
    pub fn with_default_token_path() -> Result<Self, TokenError> {
        Ok(Self::new(default_token_path()?))
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_oauth(mut self, oauth: OAuthConfig) -> Self {
        self.oauth = oauth;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        self.connect_timeout_secs = connect_timeout_secs;
        self.read_timeout_secs = read_timeout_secs;
        self
    }
}
