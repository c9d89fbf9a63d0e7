//! # stager-core
//!
//! Shared configuration and logging bootstrap for the stager crates.
//!
//! - `config`: layered TOML configuration (`[git]`, `[diff]`, `[log]`)
//! - `logging`: tracing subscriber setup with optional file output

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, DiffConfig, GitConfig, LogConfig};
pub use error::{ConfigError, ConfigResult};
pub use logging::init_logging;

use std::path::PathBuf;

/// Configuration home, respecting `XDG_CONFIG_HOME` before falling back to
/// the platform config directory.
pub fn get_config_home() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg));
        }
    }
    dirs::home_dir().map(|h| h.join(".config"))
}
