use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::extensions::build::{DEFAULT_CACHE_DIR, DEFAULT_INSTALL_TIMEOUT, DEFAULT_TARGET};
use crate::extensions::sandbox::{DEFAULT_PLATFORM, DEFAULT_SETTLE_TIMEOUT};
use crate::extensions::session::NO_VIEW_CLOSE_DELAY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub extensions: ExtensionsConfig,
    pub build: BuildConfig,
    pub dependencies: DependenciesConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    pub directory: String,
    /// Where per-extension `LocalStorage` files live.
    pub support_directory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub bundler: String,
    pub target: String,
    pub cache_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependenciesConfig {
    pub installer: String,
    pub install_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub no_view_close_delay_ms: u64,
    pub settle_timeout_ms: u64,
    pub platform: String,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            directory: data_path("extensions"),
            support_directory: data_path("support"),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            bundler: "esbuild".to_string(),
            target: DEFAULT_TARGET.to_string(),
            cache_dir: DEFAULT_CACHE_DIR.to_string(),
        }
    }
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            installer: "npm".to_string(),
            install_timeout_secs: DEFAULT_INSTALL_TIMEOUT.as_secs(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            no_view_close_delay_ms: NO_VIEW_CLOSE_DELAY.as_millis() as u64,
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT.as_millis() as u64,
            platform: DEFAULT_PLATFORM.to_string(),
        }
    }
}

fn data_path(leaf: &str) -> String {
    match dirs::data_dir() {
        Some(dir) => dir.join("nova").join(leaf).to_string_lossy().into_owned(),
        None => format!("~/.local/share/nova/{}", leaf),
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

impl HostConfig {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
            })
            .join("nova")
            .join("extensions.toml")
    }

    /// Load config from the default path, or return defaults if it is
    /// missing or broken.
    pub fn load() -> Self {
        let path = Self::config_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load config from a file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate();
        Ok(config)
    }

    /// Clamp values to usable ranges
    fn validate(&mut self) {
        self.dependencies.install_timeout_secs = self.dependencies.install_timeout_secs.clamp(1, 3600);
        self.runtime.no_view_close_delay_ms = self.runtime.no_view_close_delay_ms.min(60_000);
        self.runtime.settle_timeout_ms = self.runtime.settle_timeout_ms.clamp(10, 60_000);

        if self.build.cache_dir.is_empty() || self.build.cache_dir.contains(['/', '\\']) {
            self.build.cache_dir = DEFAULT_CACHE_DIR.to_string();
        }
        if self.runtime.platform.is_empty() {
            self.runtime.platform = DEFAULT_PLATFORM.to_string();
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = self.to_toml()?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn extensions_dir(&self) -> PathBuf {
        expand(&self.extensions.directory)
    }

    /// Storage directory for one extension.
    pub fn support_dir(&self, extension_id: &str) -> PathBuf {
        expand(&self.extensions.support_directory).join(extension_id)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.dependencies.install_timeout_secs)
    }

    pub fn no_view_close_delay(&self) -> Duration {
        Duration::from_millis(self.runtime.no_view_close_delay_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime.settle_timeout_ms)
    }
}
