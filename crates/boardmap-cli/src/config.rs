//! Configuration loading and validation

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use boardmap_core::Mode;
use boardmap_registry::{DEFAULT_TIMEOUT_SECS, REGISTRY_API};

/// Environment variable holding a private-board access token.
pub const AUTH_TOKEN_ENV: &str = "BOARDMAP_API_AUTH_TOKEN";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry endpoint
    #[serde(default = "default_registry_url")]
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_registry_url() -> String {
    REGISTRY_API.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot file to use instead of the copy packaged with the
    /// tool. Useful when a sync has produced a fresher snapshot than
    /// the installed one.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Database mode used when none is given on the command line
    #[serde(default)]
    pub mode: Mode,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.registry.timeout_secs)
    }

    /// Access token for private boards, taken from the environment so
    /// it never lands in a config file under version control.
    pub fn auth_token(&self) -> Option<String> {
        std::env::var(AUTH_TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
