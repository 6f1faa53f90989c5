// Settings module: the only place that reads the process environment.
// Everything else receives a `Settings` value (or the pieces it needs)
// so tests can point the CLI at temporary directories and mock servers.

use crate::error::{BwmError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var: API key, takes precedence over the credentials file.
pub const API_KEY_ENV_VAR: &str = "BING_WEBMASTER_API_KEY";
/// Env var: directory holding both local documents.
pub const CONFIG_DIR_ENV_VAR: &str = "BWM_CONFIG_DIR";
/// Env var: explicit credentials file path.
pub const CREDENTIALS_FILE_ENV_VAR: &str = "BWM_CREDENTIALS_FILE";
/// Env var: explicit app config file path.
pub const APP_CONFIG_FILE_ENV_VAR: &str = "BWM_APP_CONFIG_FILE";
/// Env var: API base URL override.
pub const API_BASE_URL_ENV_VAR: &str = "BWM_API_BASE_URL";
/// Env var: HTTP timeout in seconds.
pub const TIMEOUT_ENV_VAR: &str = "BWM_TIMEOUT_SECS";

pub const DEFAULT_BASE_URL: &str = "https://ssl.bing.com/webmaster/api.svc/json";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const APP_DIR_NAME: &str = "bing-webmaster-cli";

/// Resolved runtime settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials_file: PathBuf,
    pub app_config_file: PathBuf,
    /// Value of `BING_WEBMASTER_API_KEY`, if set and non-blank.
    pub env_api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config_dir = match var(CONFIG_DIR_ENV_VAR) {
            Some(dir) => expand_home(&dir),
            None => default_config_dir(),
        };
        let credentials_file = var(CREDENTIALS_FILE_ENV_VAR)
            .map(|p| expand_home(&p))
            .unwrap_or_else(|| config_dir.join("credentials.json"));
        let app_config_file = var(APP_CONFIG_FILE_ENV_VAR)
            .map(|p| expand_home(&p))
            .unwrap_or_else(|| config_dir.join("config.json"));

        let base_url = var(API_BASE_URL_ENV_VAR)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let timeout = match var(TIMEOUT_ENV_VAR) {
            Some(raw) => parse_timeout(&raw)?,
            None => DEFAULT_TIMEOUT,
        };

        Ok(Settings {
            credentials_file,
            app_config_file,
            env_api_key: var(API_KEY_ENV_VAR).map(|k| k.trim().to_string()),
            base_url,
            timeout,
        })
    }

    /// Settings rooted at `dir`, with no API key in the environment.
    pub fn in_dir(dir: &Path) -> Self {
        Settings {
            credentials_file: dir.join("credentials.json"),
            app_config_file: dir.join("config.json"),
            env_api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(BwmError::config(format!(
            "{TIMEOUT_ENV_VAR} must be a positive number of seconds, got '{raw}'"
        ))),
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn expand_home(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(value)
}
