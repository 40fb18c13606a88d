//! Tokens, session state and the OAuth2 login flow.
//!
//! The session is owned by the connection manager; nothing here is global.
//! Tokens are persisted as JSON so a later run can skip the interactive login
//! while the token is still valid.

mod login;
mod oauth;
mod session;
mod token;

pub use login::{LoginError, LoginProvider, NoInteractiveLogin};
pub use oauth::{
    AuthorizationRequest, DEFAULT_REDIRECT_URI, DEFAULT_SCOPE, OAuthConfig, OSF_AUTHORIZE_URL,
    OSF_LOGOUT_URL, token_from_redirect,
};
pub(crate) use session::BearerLookup;
pub use session::{LoggedInUser, Session};
pub(crate) use token::now_secs;
pub use token::{
    APP_DIR_NAME, TOKEN_FILE_NAME, Token, TokenError, TokenStore, default_token_path,
};
