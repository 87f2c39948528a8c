//! Configuration types for the updater.

use crate::error::{Result, UpdaterError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level updater configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Descriptor URL. `None` disables updating entirely.
    pub server_url: Option<String>,
    /// Version of the running application.
    pub current_version: String,
    /// Directory the installer is downloaded into (None = platform default).
    pub download_dir: Option<PathBuf>,
    /// Maximum number of queued commands before submitters block.
    pub queue_capacity: usize,
    /// Terminate the process after the installer has been launched.
    pub exit_after_launch: bool,
    /// HTTP client settings.
    pub http: HttpConfig,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            current_version: env!("CARGO_PKG_VERSION").to_owned(),
            download_dir: None,
            queue_capacity: 16,
            exit_after_launch: true,
            http: HttpConfig::default(),
        }
    }
}

/// HTTP client configuration for descriptor and artifact downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-read timeout in seconds.
    pub read_timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            read_timeout_secs: 300,
            user_agent: format!("fae/{} (self-update)", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl UpdaterConfig {
    /// Config with updating enabled against `server_url`.
    pub fn with_server_url(server_url: impl Into<String>) -> Self {
        Self {
            server_url: Some(server_url.into()),
            ..Self::default()
        }
    }

    /// Directory downloads land in, resolving the platform default.
    pub fn effective_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(crate::fae_dirs::update_dir)
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero queue capacity, a blank server URL or a
    /// server URL that does not parse.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(UpdaterError::Config(
                "queue_capacity must be at least 1".to_owned(),
            ));
        }
        if let Some(server_url) = &self.server_url {
            if server_url.trim().is_empty() {
                return Err(UpdaterError::Config("server_url is empty".to_owned()));
            }
            url::Url::parse(server_url).map_err(|e| {
                UpdaterError::Config(format!("server_url {server_url:?} is invalid: {e}"))
            })?;
        }
        Ok(())
    }

    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| UpdaterError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdaterError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/fae/updater.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::fae_dirs::config_dir().join("updater.toml")
    }
}
