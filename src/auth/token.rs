//! OAuth2 access tokens and their on-disk persistence.
//!
//! The token file lives at `~/.config/osf-connection/token.json` (or
//! `$XDG_CONFIG_HOME/osf-connection/token.json`) and is written with
//! owner-only permissions on Unix.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Directory name used below the user config directory.
pub const APP_DIR_NAME: &str = "osf-connection";

/// File name of the persisted token.
pub const TOKEN_FILE_NAME: &str = "token.json";

/// Errors for token persistence.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// No suitable user config directory is available.
    #[error("unable to determine config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigDirUnavailable,
    /// Filesystem I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The token file is not a valid token document.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// An OAuth2 bearer token with its absolute expiry.
///
/// The access token is redacted in Debug output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    /// Expiry in seconds since the Unix epoch.
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Token {
    pub fn new(access_token: impl Into<String>, expires_at: u64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
            token_type: Some("bearer".to_string()),
            scope: None,
        }
    }

    /// Creates a token that expires `expires_in` seconds from now.
    pub fn expiring_in(access_token: impl Into<String>, expires_in: u64) -> Self {
        Self::new(access_token, now_secs().saturating_add(expires_in))
    }

    /// Returns true while the token has not expired.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_secs())
    }

    #[must_use]
    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Seconds since the Unix epoch; a clock set before 1970 reads as zero.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Loads, persists and clears the token file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by [`default_token_path`].
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::ConfigDirUnavailable`] if no usable config dir is found.
    pub fn at_default_path() -> Result<Self, TokenError> {
        Ok(Self::new(default_token_path()?))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted token. A missing file yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<Token>, TokenError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let token = serde_json::from_slice::<Token>(&bytes)?;
        Ok(Some(token))
    }

    /// Writes the token as JSON, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when serialization or file writing fails.
    pub fn persist(&self, token: &Token) -> Result<(), TokenError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(token)?;
        let mut file = open_owner_only(&self.path)?;
        file.write_all(&json)?;
        file.flush()?;
        debug!(path = %self.path.display(), "token persisted");
        Ok(())
    }

    /// Removes the persisted token.
    ///
    /// Returns `true` when the token file existed and was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when file removal fails.
    pub fn clear(&self) -> Result<bool, TokenError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "token file removed");
                Ok(true)
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}

/// Opens the token file for writing; it is owner-only before any byte is written.
#[cfg(unix)]
fn open_owner_only(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies to new files.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_owner_only(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Returns the default token path (`~/.config/osf-connection/token.json`).
///
/// # Errors
///
/// Returns [`TokenError::ConfigDirUnavailable`] if no usable config dir is found.
pub fn default_token_path() -> Result<PathBuf, TokenError> {
    Ok(default_config_dir()?.join(TOKEN_FILE_NAME))
}

fn default_config_dir() -> Result<PathBuf, TokenError> {
    resolve_config_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("APPDATA")),
    )
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_config_dir(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    app_data: Option<PathBuf>,
) -> Result<PathBuf, TokenError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join(APP_DIR_NAME));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join(APP_DIR_NAME));
    }
    if let Some(app_data) = app_data {
        return Ok(app_data.join(APP_DIR_NAME));
    }

    Err(TokenError::ConfigDirUnavailable)
}
