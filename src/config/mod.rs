//! Configuration management.
//!
//! Settings live in `~/.cardsync/config.json`. Every value can be overridden
//! from the environment; the resolution order is always
//! env var > config file > built-in default.
//!
//! | Setting       | Env var             | Default                              |
//! |---------------|---------------------|--------------------------------------|
//! | endpoint      | `CARDSYNC_ENDPOINT` | none (required for `sync`)           |
//! | account       | `CARDSYNC_ACCOUNT`  | `default`                            |
//! | access token  | `CARDSYNC_TOKEN`    | none                                 |
//! | database      | `CARDSYNC_DB`       | `~/.cardsync/data/collection.db`     |

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::SyncSettings;

pub const ENV_ENDPOINT: &str = "CARDSYNC_ENDPOINT";
pub const ENV_ACCOUNT: &str = "CARDSYNC_ACCOUNT";
pub const ENV_TOKEN: &str = "CARDSYNC_TOKEN";
pub const ENV_DB: &str = "CARDSYNC_DB";

const DEFAULT_ACCOUNT: &str = "default";

fn default_page_size() -> usize {
    crate::remote::http::DEFAULT_PAGE_SIZE
}

fn default_sub_batch_size() -> usize {
    crate::sync::DEFAULT_SUB_BATCH_SIZE
}

const fn default_fetch_timeout_secs() -> u64 {
    30
}

const fn default_fetch_retries() -> u32 {
    2
}

/// Contents of `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardsyncConfig {
    /// Base URL of the remote flashcard service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Account the checkpoint is stored under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_sub_batch_size")]
    pub sub_batch_size: usize,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// OAuth authorization endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorize_url: Option<String>,

    /// OAuth token endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl Default for CardsyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            account: None,
            access_token: None,
            page_size: default_page_size(),
            sub_batch_size: default_sub_batch_size(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_retries: default_fetch_retries(),
            authorize_url: None,
            token_url: None,
            client_id: None,
        }
    }
}

impl CardsyncConfig {
    /// Remote endpoint, or a config error naming how to set it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if neither the env var nor the file sets it.
    pub fn resolve_endpoint(&self) -> Result<String> {
        pick(env_value(ENV_ENDPOINT), self.endpoint.as_deref()).ok_or_else(|| {
            Error::Config(format!(
                "No remote endpoint configured; set {ENV_ENDPOINT} or \"endpoint\" in config.json"
            ))
        })
    }

    #[must_use]
    pub fn resolve_account(&self) -> String {
        pick(env_value(ENV_ACCOUNT), self.account.as_deref())
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string())
    }

    #[must_use]
    pub fn resolve_token(&self) -> Option<String> {
        pick(env_value(ENV_TOKEN), self.access_token.as_deref())
    }

    /// Settings for one coordinator run.
    #[must_use]
    pub fn sync_settings(&self, account: String) -> SyncSettings {
        SyncSettings {
            account,
            sub_batch_size: self.sub_batch_size.max(1),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            fetch_retries: self.fetch_retries,
            ..SyncSettings::default()
        }
    }
}

/// First non-empty of env value and config value.
fn pick(env: Option<String>, config: Option<&str>) -> Option<String> {
    env.or_else(|| {
        config
            .filter(|v| !v.trim().is_empty())
            .map(ToString::to_string)
    })
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// The global cardsync directory, `~/.cardsync/`.
#[must_use]
pub fn global_cardsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".cardsync"))
}

fn config_path() -> Result<PathBuf> {
    global_cardsync_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Resolve the collection database path.
///
/// Priority:
/// 1. `explicit_path` from the `--db` flag
/// 2. `CARDSYNC_DB` environment variable
/// 3. `~/.cardsync/data/collection.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Some(db_path) = env_value(ENV_DB) {
        return Some(PathBuf::from(db_path));
    }

    global_cardsync_dir().map(|dir| dir.join("data").join("collection.db"))
}

/// Load `~/.cardsync/config.json`, or defaults if it does not exist.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<CardsyncConfig> {
    load_config_from(&config_path()?)
}

/// Load a config file from an explicit path.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<CardsyncConfig> {
    if !path.exists() {
        return Ok(CardsyncConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Save to `~/.cardsync/config.json`.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be written.
pub fn save_config(config: &CardsyncConfig) -> Result<()> {
    save_config_to(&config_path()?, config)
}

/// Save a config file to an explicit path, creating parent directories.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be written.
pub fn save_config_to(path: &Path, config: &CardsyncConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content).map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}
