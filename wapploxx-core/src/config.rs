//! Configuration management for wapploxx
//!
//! Config files are stored in platform-appropriate locations:
//! - Linux: ~/.config/wapploxx/
//! - macOS: ~/Library/Application Support/wapploxx/
//! - Windows: %APPDATA%\wapploxx\

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    NoDirFound,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
}

/// Connection settings for one controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Base URL, e.g. `https://192.168.0.10`
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Verify the controller's TLS certificate. Most controllers ship a self-signed one.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Per-request timeout in seconds. Unset means reqwest's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Idle period after which the session is considered gone
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Ask the controller to suspend its auto-logout when polling system status
    #[serde(default = "default_true")]
    pub pause_auto_logout: bool,
}

/// Immutable login data for one client instance
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub verify_tls: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

impl Credentials {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            verify_tls: true,
        }
    }

    /// Accept self-signed or otherwise unverifiable certificates
    pub fn insecure(mut self) -> Self {
        self.verify_tls = false;
        self
    }
}

fn default_true() -> bool {
    true
}
fn default_session_timeout() -> u64 {
    crate::DEFAULT_SESSION_TIMEOUT_SECS
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            verify_tls: true,
            timeout_secs: None,
            session_timeout_secs: default_session_timeout(),
            pause_auto_logout: true,
        }
    }
}

impl ControllerConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            verify_tls: self.verify_tls,
            ..Credentials::new(&self.url, &self.username, &self.password)
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

impl Config {
    /// Get config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("wapploxx"))
            .ok_or(ConfigError::NoDirFound)
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from specific path
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
