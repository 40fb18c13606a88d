//! Explicitly owned session state: the current token and logged-in user.

use serde::Deserialize;

use super::token::Token;

/// The account the session is authenticated as.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedInUser {
    pub id: String,
    pub full_name: Option<String>,
    /// The full "current user" document as returned by the API.
    pub raw: serde_json::Value,
}

#[derive(Deserialize)]
struct UserDocument {
    data: UserData,
}

#[derive(Deserialize)]
struct UserData {
    id: String,
    #[serde(default)]
    attributes: UserAttributes,
}

#[derive(Default, Deserialize)]
struct UserAttributes {
    #[serde(default)]
    full_name: Option<String>,
}

impl LoggedInUser {
    /// Parses the API's current-user document (`data.id`, `data.attributes.full_name`).
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the body is not a user document.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: serde_json::Value = serde_json::from_slice(body)?;
        let document = UserDocument::deserialize(&raw)?;
        Ok(Self {
            id: document.data.id,
            full_name: document.data.attributes.full_name,
            raw,
        })
    }

    /// Full name when known, otherwise the id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.id)
    }
}

/// Result of asking the session for a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BearerLookup {
    Valid(String),
    /// The token was expired and has been discarded from the session.
    Expired,
    Missing,
}

/// Current token, logged-in identity and the interactive-login latch.
#[derive(Debug, Default)]
pub struct Session {
    token: Option<Token>,
    user: Option<LoggedInUser>,
    login_in_progress: bool,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    pub fn clear_token(&mut self) -> Option<Token> {
        self.token.take()
    }

    #[must_use]
    pub fn user(&self) -> Option<&LoggedInUser> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id.as_str())
    }

    pub fn set_user(&mut self, user: LoggedInUser) {
        self.user = Some(user);
    }

    pub fn clear_user(&mut self) -> Option<LoggedInUser> {
        self.user.take()
    }

    /// True when a token is present and has not expired.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.token.as_ref().is_some_and(Token::is_valid)
    }

    /// Drops token and identity.
    pub fn clear(&mut self) {
        self.token = None;
        self.user = None;
    }

    pub(crate) fn bearer_at(&mut self, now: u64) -> BearerLookup {
        match &self.token {
            Some(token) if token.is_valid_at(now) => BearerLookup::Valid(token.access_token.clone()),
            Some(_) => {
                self.token = None;
                BearerLookup::Expired
            }
            None => BearerLookup::Missing,
        }
    }

    /// Claims the interactive-login latch; false when a login is already running.
    pub(crate) fn begin_login(&mut self) -> bool {
        if self.login_in_progress {
            return false;
        }
        self.login_in_progress = true;
        true
    }

    pub(crate) fn end_login(&mut self) {
        self.login_in_progress = false;
    }

    #[must_use]
    pub fn is_login_in_progress(&self) -> bool {
        self.login_in_progress
    }
}
