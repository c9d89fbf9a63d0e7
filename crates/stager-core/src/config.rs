//! Configuration management for stager
//!
//! Supports feature-specific configuration sections:
//! - [git] - repository defaults and fallback identities
//! - [diff] - diff report parsing policy
//! - [log] - logging level and optional log directory

use crate::error::ConfigResult;
use crate::get_config_home;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: &str = "1";

/// Supported configuration versions
pub const SUPPORTED_CONFIG_VERSIONS: &[&str] = &["1"];

/// Repository-local configuration file name
pub const REPO_CONFIG_FILE: &str = ".stager.toml";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for tracking schema changes
    #[serde(default = "default_config_version")]
    pub version: String,

    #[serde(default)]
    pub git: Option<GitConfig>,

    #[serde(default)]
    pub diff: Option<DiffConfig>,

    #[serde(default)]
    pub log: Option<LogConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            git: None,
            diff: None,
            log: None,
        }
    }
}

/// Repository defaults used when opening handles and writing commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Name used when no student identity is known
    #[serde(default = "default_system_name")]
    pub system_name: String,

    #[serde(default = "default_system_email")]
    pub system_email: String,

    #[serde(default = "default_remote_name")]
    pub remote_name: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            system_name: default_system_name(),
            system_email: default_system_email(),
            remote_name: default_remote_name(),
        }
    }
}

/// Diff report parsing policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffConfig {
    #[serde(default)]
    pub use_absolute_line_count: bool,

    #[serde(default)]
    pub ignore_whitespace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// When set, logs are also written to `<directory>/stager.log`
    #[serde(default)]
    pub directory: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_config_version() -> String {
    CURRENT_CONFIG_VERSION.to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_system_name() -> String {
    "Artemis".to_string()
}

fn default_system_email() -> String {
    "artemis@localhost".to_string()
}

fn default_remote_name() -> String {
    "origin".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Check if the configuration version is supported
    pub fn is_version_supported(&self) -> bool {
        SUPPORTED_CONFIG_VERSIONS.contains(&self.version.as_str())
    }

    /// Get a warning message for unsupported versions
    pub fn version_warning(&self) -> Option<String> {
        if !self.is_version_supported() {
            Some(format!(
                "Warning: Configuration version '{}' is not supported. Supported versions: {}. Using defaults where needed.",
                self.version,
                SUPPORTED_CONFIG_VERSIONS.join(", ")
            ))
        } else {
            None
        }
    }

    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        if let Some(warning) = config.version_warning() {
            eprintln!("{}", warning);
        }

        if config.version.is_empty() {
            config.version = CURRENT_CONFIG_VERSION.to_string();
        }

        Ok(config)
    }

    /// Get the default config directory path
    pub fn get_config_dir() -> Option<PathBuf> {
        get_config_home().map(|h| h.join("stager"))
    }

    /// Load configuration with priority:
    /// 1. Defaults
    /// 2. Global config (~/.config/stager/config.toml)
    /// 3. Repo config (.stager.toml)
    /// 4. Explicit config file, if given
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(config_dir) = Self::get_config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                if let Ok(loaded) = Self::load_from_file(&global_config) {
                    config = config.merge(loaded);
                }
            }
        }

        let repo_config = PathBuf::from(REPO_CONFIG_FILE);
        if repo_config.exists() {
            if let Ok(loaded) = Self::load_from_file(&repo_config) {
                config = config.merge(loaded);
            }
        }

        // An explicitly requested file must load
        if let Some(path) = explicit {
            config = config.merge(Self::load_from_file(path)?);
        }

        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(mut self, other: Config) -> Self {
        if !other.version.is_empty() {
            self.version = other.version;
        }
        if other.git.is_some() {
            self.git = other.git;
        }
        if other.diff.is_some() {
            self.diff = other.diff;
        }
        if other.log.is_some() {
            self.log = other.log;
        }
        self
    }

    pub fn git(&self) -> GitConfig {
        self.git.clone().unwrap_or_default()
    }

    pub fn diff(&self) -> DiffConfig {
        self.diff.clone().unwrap_or_default()
    }

    pub fn log(&self) -> LogConfig {
        self.log.clone().unwrap_or_default()
    }
}
