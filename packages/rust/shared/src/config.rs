//! Application configuration for plone-mcp.
//!
//! User config lives at `~/.plone-mcp/plone-mcp.toml`.
//! CLI flags override environment variables, which override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PloneMcpError, Result};
use crate::types::Credentials;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "plone-mcp.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".plone-mcp";

/// Environment variable overriding `plone.url`.
pub const PLONE_URL_ENV: &str = "PLONE_URL";

/// Environment variable overriding `plone.username`.
pub const PLONE_USERNAME_ENV: &str = "PLONE_USERNAME";

// ---------------------------------------------------------------------------
// Config structs (matching plone-mcp.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Plone site connection settings.
    #[serde(default)]
    pub plone: PloneConfig,

    /// Block assembly settings.
    #[serde(default)]
    pub blocks: BlocksConfig,
}

/// `[plone]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PloneConfig {
    /// Site root URL, e.g. `http://localhost:8080/Plone`.
    #[serde(default = "default_url")]
    pub url: String,

    /// Username for basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Name of the env var holding the password (never store the password itself).
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Name of the env var holding a JWT token; preferred over basic auth when set.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PloneConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password_env: default_password_env(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:8080/Plone".into()
}
fn default_password_env() -> String {
    "PLONE_PASSWORD".into()
}
fn default_token_env() -> String {
    "PLONE_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[blocks]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksConfig {
    /// Replace the built-in block schema registry with this JSON file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<PathBuf>,

    /// Verify image URLs are reachable before accepting image blocks.
    #[serde(default = "default_true")]
    pub check_images: bool,
}

impl Default for BlocksConfig {
    fn default() -> Self {
        Self {
            schema_path: None,
            check_images: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Apply `PLONE_URL` / `PLONE_USERNAME` from the environment on top of file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(PLONE_URL_ENV) {
            if !url.is_empty() {
                self.plone.url = url;
            }
        }
        if let Ok(user) = std::env::var(PLONE_USERNAME_ENV) {
            if !user.is_empty() {
                self.plone.username = Some(user);
            }
        }
        self
    }

    /// Parse and validate the configured site URL.
    pub fn site_url(&self) -> Result<Url> {
        let url = Url::parse(&self.plone.url).map_err(|e| {
            PloneMcpError::config(format!("invalid plone.url '{}': {e}", self.plone.url))
        })?;
        if url.cannot_be_a_base() {
            return Err(PloneMcpError::config(format!(
                "plone.url '{}' cannot be used as a base URL",
                self.plone.url
            )));
        }
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.plone-mcp/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PloneMcpError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.plone-mcp/plone-mcp.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PloneMcpError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PloneMcpError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PloneMcpError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PloneMcpError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PloneMcpError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve credentials from the env vars named in the config.
///
/// A token wins over basic auth. Basic auth needs both a username and a
/// non-empty password env var; anything else yields anonymous access.
pub fn resolve_credentials(config: &PloneConfig) -> Credentials {
    if let Ok(token) = std::env::var(&config.token_env) {
        if !token.is_empty() {
            return Credentials::Token(token);
        }
    }

    match (&config.username, std::env::var(&config.password_env)) {
        (Some(username), Ok(password)) if !password.is_empty() => Credentials::Basic {
            username: username.clone(),
            password,
        },
        (Some(username), _) => {
            tracing::warn!(
                username = %username,
                password_env = %config.password_env,
                "username configured but password env var is unset; using anonymous access"
            );
            Credentials::Anonymous
        }
        _ => Credentials::Anonymous,
    }
}
