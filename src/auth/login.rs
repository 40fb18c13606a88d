//! The interactive login collaborator.

use async_trait::async_trait;

use super::oauth::AuthorizationRequest;
use super::token::Token;

/// Errors raised while obtaining a token interactively.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("OAuth2 client id is not configured")]
    MissingClientId,

    #[error("invalid authorization endpoint: {url}")]
    InvalidEndpoint { url: String },

    #[error("login was cancelled")]
    Cancelled,

    #[error("authorization server refused the login ({error}): {description}")]
    Denied { error: String, description: String },

    #[error("authorization response state does not match the request")]
    StateMismatch,

    #[error("authorization response carried no access token")]
    MissingToken,

    #[error("authorization response has an invalid expires_in value '{value}'")]
    InvalidExpiry { value: String },

    #[error("login provider failed: {0}")]
    Provider(String),
}

/// Shows the authorization page to the user and returns the resulting token.
///
/// `authenticate` is awaited at most once at a time per connection manager.
/// `close` is called after every attempt, successful or not, so a provider
/// can dismiss whatever it displayed.
#[async_trait]
pub trait LoginProvider: Send + Sync {
    async fn authenticate(&self, request: AuthorizationRequest) -> Result<Token, LoginError>;

    fn close(&self) {}
}

/// Refuses every interactive login. Useful for headless, token-file-only use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInteractiveLogin;

#[async_trait]
impl LoginProvider for NoInteractiveLogin {
    async fn authenticate(&self, _request: AuthorizationRequest) -> Result<Token, LoginError> {
        Err(LoginError::Cancelled)
    }
}
