//! Terminal login: print the authorization URL, read back the redirect URL.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use osf_connection::auth::AuthorizationRequest;
use osf_connection::{LoginError, LoginProvider, Token};
use tracing::debug;
use url::Url;

/// Asks the user to open the authorization URL in a browser and paste the
/// URL the browser was redirected to.
#[derive(Debug, Default)]
pub(crate) struct PromptLogin;

#[async_trait]
impl LoginProvider for PromptLogin {
    async fn authenticate(&self, request: AuthorizationRequest) -> Result<Token, LoginError> {
        eprintln!("Open this URL in a browser and authorize access:\n\n  {}\n", request.url);
        eprint!("Paste the URL you were redirected to (empty to cancel): ");
        io::stderr()
            .flush()
            .map_err(|e| LoginError::Provider(e.to_string()))?;

        let line = tokio::task::spawn_blocking(read_line)
            .await
            .map_err(|e| LoginError::Provider(e.to_string()))?
            .map_err(|e| LoginError::Provider(e.to_string()))?;

        let redirect = parse_redirect(&line)?;
        debug!("redirect URL received");
        request.complete(&redirect)
    }

    fn close(&self) {
        eprintln!();
    }
}

fn read_line() -> io::Result<String> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

fn parse_redirect(line: &str) -> Result<Url, LoginError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(LoginError::Cancelled);
    }
    Url::parse(trimmed).map_err(|e| LoginError::Provider(format!("not a URL: {e}")))
}
