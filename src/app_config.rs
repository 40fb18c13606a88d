//! Configuration file loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// `key = value` file configuration; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// OSF API base URL.
    pub api_base_url: Option<String>,
    /// Where the access token is persisted.
    pub token_file: Option<PathBuf>,
    /// OAuth2 client id registered with OSF.
    pub client_id: Option<String>,
    /// OAuth2 redirect URI registered for the client id.
    pub redirect_uri: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.api_base_url {
            validate_url("api_base_url", url)?;
        }
        if let Some(uri) = &self.redirect_uri {
            validate_url("redirect_uri", uri)?;
        }
        if let Some(client_id) = &self.client_id
            && client_id.trim().is_empty()
        {
            bail!("Invalid config value for `client_id`: must not be empty");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .with_context(|| format!("Invalid config value for `{field}`: '{value}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("Invalid config value for `{field}`: '{value}'. Expected an http(s) URL");
    }
    Ok(())
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/osf-connection/config.toml`
/// 2. `$HOME/.config/osf-connection/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(osf_connection::auth::APP_DIR_NAME)
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(osf_connection::auth::APP_DIR_NAME)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file at `explicit`, or at the default path when present.
///
/// An explicitly named file must exist; a missing default file yields the
/// empty configuration.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return read_file_config(path);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_number = line_index + 1;

        match key {
            "api_base_url" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `api_base_url` value on line {line_number}")
                })?;
                cfg.api_base_url = Some(parsed);
            }
            "token_file" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `token_file` value on line {line_number}")
                })?;
                cfg.token_file = Some(PathBuf::from(parsed));
            }
            "client_id" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `client_id` value on line {line_number}")
                })?;
                cfg.client_id = Some(parsed);
            }
            "redirect_uri" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `redirect_uri` value on line {line_number}")
                })?;
                cfg.redirect_uri = Some(parsed);
            }
            "connect_timeout_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `connect_timeout_secs` value on line {line_number}")
                })?;
                cfg.connect_timeout_secs = Some(parsed);
            }
            "read_timeout_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `read_timeout_secs` value on line {line_number}")
                })?;
                cfg.read_timeout_secs = Some(parsed);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}
