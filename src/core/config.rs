//! Application configuration management
//!
//! Handles loading and saving engine settings including:
//! - Dashboard backend location and API key
//! - Workspace root for cloned repositories
//! - Polling cadences and timeouts

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CrewdeckError, Result};

const API_URL_ENV: &str = "CREWDECK_API_URL";
const API_KEY_ENV: &str = "CREWDECK_API_KEY";

/// Timer settings for the import pollers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between device flow completion and the success signal
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Interval increase applied on every `slow_down` response
    #[serde(default = "default_slow_down_increment")]
    pub slow_down_increment_ms: u64,

    /// Clone status polling cadence
    #[serde(default = "default_clone_poll_interval")]
    pub clone_poll_interval_ms: u64,

    /// Debounce applied to repository search input
    #[serde(default = "default_search_debounce")]
    pub search_debounce_ms: u64,

    /// Give up on a clone job that shows no progress for this long
    #[serde(default = "default_clone_stall_timeout")]
    pub clone_stall_timeout_secs: u64,

    /// Upper bound on any single backend request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_settle_delay() -> u64 {
    500
}

fn default_slow_down_increment() -> u64 {
    5000
}

fn default_clone_poll_interval() -> u64 {
    1000
}

fn default_search_debounce() -> u64 {
    300
}

fn default_clone_stall_timeout() -> u64 {
    600
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            slow_down_increment_ms: default_slow_down_increment(),
            clone_poll_interval_ms: default_clone_poll_interval(),
            search_debounce_ms: default_search_debounce(),
            clone_stall_timeout_secs: default_clone_stall_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl PollingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn slow_down_increment(&self) -> Duration {
        Duration::from_millis(self.slow_down_increment_ms)
    }

    pub fn clone_poll_interval(&self) -> Duration {
        Duration::from_millis(self.clone_poll_interval_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn clone_stall_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_stall_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the dashboard backend
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Optional API key sent as a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Directory under which repositories are cloned when no target is given
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Open the verification page automatically during the device flow
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,

    #[serde(default)]
    pub polling: PollingConfig,
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_open_browser() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            workspace_root: default_workspace_root(),
            open_browser: default_open_browser(),
            polling: PollingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default file, or defaults if it does not exist
    ///
    /// Environment variables (`CREWDECK_API_URL`, `CREWDECK_API_KEY`) override the file.
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load from an explicit file when given, else from the default location
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "crewdeck", "crewdeck")
            .ok_or_else(|| CrewdeckError::Config("Could not determine config directory".into()))?;

        Ok(project_dirs.config_dir().join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.is_empty() {
                self.api_url = url;
            }
        }
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
    }

    /// Check that the backend URL is usable
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CrewdeckError::Config(format!(
                "api_url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        Ok(())
    }

    /// Default clone location for a repository
    pub fn default_target_path(&self, repo_name: &str) -> PathBuf {
        self.workspace_root.join(repo_name)
    }
}
