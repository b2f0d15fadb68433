use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use storefront_notifications::NotificationConfig;
use tracing::debug;

const APP_DIR: &str = "storefront-notify";
const CONFIG_FILE: &str = "config.toml";

/// Contents of `config.toml`. Every field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Emit logs as JSON instead of human-readable lines
    pub json_logs: bool,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default location if it exists.
    ///
    /// An explicit path must exist; a missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Command-line flags win over the file.
    pub fn apply_overrides(&mut self, base_url: Option<String>) {
        if let Some(base_url) = base_url {
            self.notifications.base_url = base_url;
        }
    }

    pub fn show(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
