//! OAuth2 implicit-grant helpers for the OSF accounts server.

use rand::Rng;
use rand::distributions::Alphanumeric;
use url::Url;

use super::login::LoginError;
use super::token::Token;

/// OSF authorization endpoint.
pub const OSF_AUTHORIZE_URL: &str = "https://accounts.osf.io/oauth2/authorize";

/// OSF token revocation endpoint, used for logout.
pub const OSF_LOGOUT_URL: &str = "https://accounts.osf.io/oauth2/revoke";

/// Scope requested by default: read and write access to the user's projects.
pub const DEFAULT_SCOPE: &str = "osf.full_write";

/// Redirect URI registered for the application by default.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost/osf-connection/callback";

const STATE_LEN: usize = 32;

/// Settings of the registered OAuth2 application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub client_id: String,
    pub authorize_url: String,
    pub redirect_uri: String,
    pub scope: String,
    pub logout_url: String,
}

impl OAuthConfig {
    /// OSF endpoints with the given client id.
    pub fn osf(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authorize_url: OSF_AUTHORIZE_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            logout_url: OSF_LOGOUT_URL.to_string(),
        }
    }

    /// Builds an implicit-grant authorization URL with a fresh random `state`.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::MissingClientId`] when no client id is configured and
    /// [`LoginError::InvalidEndpoint`] when the authorize URL does not parse.
    pub fn authorization_url(&self) -> Result<AuthorizationRequest, LoginError> {
        if self.client_id.trim().is_empty() {
            return Err(LoginError::MissingClientId);
        }
        let mut url = Url::parse(&self.authorize_url).map_err(|_| LoginError::InvalidEndpoint {
            url: self.authorize_url.clone(),
        })?;
        let state = random_state();
        url.query_pairs_mut()
            .append_pair("response_type", "token")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("state", &state);
        Ok(AuthorizationRequest { url, state })
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::osf(String::new())
    }
}

/// An authorization URL together with the `state` it was issued with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

impl AuthorizationRequest {
    /// Parses the URL the browser was redirected to after authorizing.
    ///
    /// # Errors
    ///
    /// See [`token_from_redirect`].
    pub fn complete(&self, redirect: &Url) -> Result<Token, LoginError> {
        token_from_redirect(redirect, &self.state)
    }
}

/// Extracts the token from an implicit-grant redirect.
///
/// Parameters are read from the URL fragment, falling back to the query string.
///
/// # Errors
///
/// Returns [`LoginError::Denied`] for an `error=` response,
/// [`LoginError::StateMismatch`] when `state` differs from `expected_state`,
/// and [`LoginError::MissingToken`] / [`LoginError::InvalidExpiry`] for
/// incomplete responses.
pub fn token_from_redirect(redirect: &Url, expected_state: &str) -> Result<Token, LoginError> {
    let raw = redirect
        .fragment()
        .filter(|fragment| !fragment.is_empty())
        .or_else(|| redirect.query())
        .unwrap_or_default();

    let mut access_token = None;
    let mut expires_in = None;
    let mut state = None;
    let mut token_type = None;
    let mut scope = None;
    let mut error = None;
    let mut error_description = None;
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let value = value.into_owned();
        match key.as_ref() {
            "access_token" => access_token = Some(value),
            "expires_in" => expires_in = Some(value),
            "state" => state = Some(value),
            "token_type" => token_type = Some(value),
            "scope" => scope = Some(value),
            "error" => error = Some(value),
            "error_description" => error_description = Some(value),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(LoginError::Denied {
            error,
            description: error_description.unwrap_or_default(),
        });
    }
    if state.as_deref() != Some(expected_state) {
        return Err(LoginError::StateMismatch);
    }
    let access_token = access_token
        .filter(|token| !token.is_empty())
        .ok_or(LoginError::MissingToken)?;
    let expires_in = match expires_in {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| LoginError::InvalidExpiry { value })?,
        None => return Err(LoginError::InvalidExpiry { value: String::new() }),
    };

    let mut token = Token::expiring_in(access_token, expires_in);
    if token_type.is_some() {
        token.token_type = token_type;
    }
    token.scope = scope;
    Ok(token)
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}
