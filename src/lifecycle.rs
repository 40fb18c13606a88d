//! Login and logout transitions of the session.

use std::future::IntoFuture;

use tracing::{debug, info, instrument, warn};

use crate::auth::{LoggedInUser, LoginError, TokenError};
use crate::manager::{ConnectionManager, SessionEvent};
use crate::notify::Notification;
use crate::request::dispatch::{RequestBody, ResponseTarget, Tracking};
use crate::request::{RequestError, RequestOptions};

/// Errors of the login flow.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("login failed: {0}")]
    Login(#[from] LoginError),

    #[error("could not fetch the logged-in user: {0}")]
    Request(#[from] RequestError),

    #[error("the current-user document is invalid: {0}")]
    InvalidUser(#[source] serde_json::Error),

    #[error("an interactive login is already in progress")]
    LoginInProgress,

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Releases the interactive-login latch when the login attempt ends, even if
/// its future is dropped.
struct LoginLatch<'a> {
    manager: &'a ConnectionManager,
}

impl Drop for LoginLatch<'_> {
    fn drop(&mut self) {
        self.manager.session().end_login();
    }
}

impl ConnectionManager {
    /// Logs in with the stored token when it is still valid, interactively otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the interactive login fails or the
    /// current user cannot be fetched.
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<LoggedInUser, SessionError> {
        if self.check_for_stored_token() {
            info!("logging in with stored token");
            return self.handle_login().await;
        }
        self.show_login().await
    }

    /// Runs the interactive login through the login provider.
    ///
    /// Only one interactive login runs at a time.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LoginInProgress`] when another login is running,
    /// otherwise the failure of the provider or of [`handle_login`](Self::handle_login).
    pub async fn show_login(&self) -> Result<LoggedInUser, SessionError> {
        if !self.session().begin_login() {
            return Err(SessionError::LoginInProgress);
        }
        let _latch = LoginLatch { manager: self };
        self.interactive_login().await
    }

    async fn interactive_login(&self) -> Result<LoggedInUser, SessionError> {
        let request = match self.inner.oauth.authorization_url() {
            Ok(request) => request,
            Err(error) => {
                self.notify(Notification::error("Login failed", error.to_string()));
                return Err(error.into());
            }
        };
        info!(url = %request.url, "waiting for interactive login");

        let outcome = self.inner.login.authenticate(request).await;
        self.inner.login.close();
        let token = match outcome {
            Ok(token) => token,
            Err(LoginError::Cancelled) => {
                info!("login cancelled");
                return Err(LoginError::Cancelled.into());
            }
            Err(error) => {
                self.notify(Notification::error("Login failed", error.to_string()));
                return Err(error.into());
            }
        };

        if let Err(error) = self.inner.token_store.persist(&token) {
            warn!(
                path = %self.inner.token_store.path().display(),
                error = %error,
                "could not persist token"
            );
        }
        self.session().set_token(token);
        self.handle_login().await
    }

    /// Loads a persisted token into the session.
    ///
    /// Returns true when a valid token was loaded. An expired token is removed
    /// from the session and from disk; an unreadable file is only logged.
    pub fn check_for_stored_token(&self) -> bool {
        let store = &self.inner.token_store;
        debug!(path = %store.path().display(), "looking for stored token");
        let token = match store.load() {
            Ok(Some(token)) => token,
            Ok(None) => return false,
            Err(error) => {
                warn!(path = %store.path().display(), error = %error, "stored token could not be read");
                return false;
            }
        };

        if token.is_valid() {
            self.session().set_token(token);
            return true;
        }

        info!("stored token expired; login required");
        self.session().clear_token();
        if let Err(error) = store.clear() {
            warn!(error = %error, "could not remove expired token file");
        }
        false
    }

    /// Fetches the current user, stores it, announces the login and replays the
    /// requests parked for that user.
    ///
    /// The replays run one after another on a background task, in the order
    /// the requests were registered.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the current user cannot be fetched or parsed.
    pub async fn handle_login(&self) -> Result<LoggedInUser, SessionError> {
        let reply = self.get_logged_in_user(RequestOptions::default()).await?;
        let user = LoggedInUser::from_json(reply.body()).map_err(SessionError::InvalidUser)?;
        info!(user_id = %user.id, name = %user.display_name(), "logged in");

        self.session().set_user(user.clone());
        self.emit(SessionEvent::LoggedIn {
            user_id: user.id.clone(),
        });

        let replays = self.pending().replay_all(&user.id);
        if !replays.is_empty() {
            info!(count = replays.len(), "replaying requests parked during login");
            tokio::spawn(replays.into_future());
        }
        Ok(user)
    }

    /// Clears identity and token from the session and announces the logout.
    pub fn handle_logout(&self) {
        let previous = {
            let mut session = self.session();
            session.clear_token();
            session.clear_user()
        };
        if let Some(user) = previous {
            info!(user_id = %user.id, "logged out");
        }
        self.emit(SessionEvent::LoggedOut);
    }

    /// Revokes the token on the server, then logs out locally whatever the outcome.
    ///
    /// Does nothing when the session is not authorized.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let token = {
            let session = self.session();
            match session.token() {
                Some(token) if session.is_authorized() => token.access_token.clone(),
                _ => {
                    debug!("logout requested without an authorized session");
                    return;
                }
            }
        };

        let logout_url = self.inner.oauth.logout_url.clone();
        let result = self
            .dispatch(
                reqwest::Method::POST,
                &logout_url,
                RequestBody::Form(vec![("token".to_string(), token)]),
                ResponseTarget::Buffer,
                RequestOptions::default(),
                Tracking::Internal,
            )
            .await;
        if let Err(error) = result {
            warn!(error = %error, "token revocation failed; logging out locally");
        }
        self.dispatch_logout();
    }

    /// Local logout: removes the persisted token, then clears the session.
    pub(crate) fn dispatch_logout(&self) {
        if let Err(error) = self.inner.token_store.clear() {
            warn!(error = %error, "could not remove token file");
        }
        self.handle_logout();
    }

    /// Logs out locally and starts one interactive login in the background.
    ///
    /// When that login fails while requests are parked, an error notification
    /// says so; the requests stay parked until the next login or their abort.
    pub(crate) fn begin_reauthentication(&self) {
        self.dispatch_logout();
        let manager = self.clone();
        tokio::spawn(async move {
            match manager.show_login().await {
                Ok(user) => info!(user_id = %user.id, "re-authenticated"),
                Err(SessionError::LoginInProgress) => debug!("interactive login already running"),
                Err(error) => {
                    let parked = manager.pending_count();
                    warn!(error = %error, parked, "re-authentication failed");
                    if parked > 0 && !error.is_reported() {
                        manager.notify(Notification::error(
                            "Login failed",
                            format!("{error}; {parked} request(s) wait for the next login"),
                        ));
                    }
                }
            }
        });
    }
}

impl SessionError {
    /// True when the failure already produced an error notification on its way up.
    fn is_reported(&self) -> bool {
        match self {
            Self::Login(LoginError::Cancelled)
            | Self::InvalidUser(_)
            | Self::LoginInProgress
            | Self::Token(_) => false,
            Self::Login(_) | Self::Request(_) => true,
        }
    }
}
