//! Configuration management

use crate::core::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub rewrite: RewriteConfig,
}

/// Defaults for the web display options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Remove the common file prefix in file listings
    pub remove_fp: bool,
    /// Only show identifier properties that hold
    pub show_true: bool,
    /// Annotate source listings with line numbers
    pub show_line_number: bool,
    /// Case-insensitive file name matching
    pub file_icase: bool,
    /// Tab width for source output
    pub tab_width: usize,
    /// Reverse-sort identifier names
    pub sort_rev: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Command invoked before a renamed file is replaced
    pub checkout_hook: String,
    /// Command invoked after a renamed file is replaced
    pub checkin_hook: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: DisplayConfig::default(),
            rewrite: RewriteConfig::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            remove_fp: false,
            show_true: false,
            show_line_number: false,
            file_icase: false,
            tab_width: 8,
            sort_rev: false,
        }
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            checkout_hook: "scour_checkout".to_string(),
            checkin_hook: "scour_checkin".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::scour_home()?.join("config.toml"))
    }

    /// Get the scour home directory
    pub fn scour_home() -> Result<PathBuf> {
        // Check SCOUR_HOME env var first
        if let Ok(home) = std::env::var("SCOUR_HOME") {
            return Ok(PathBuf::from(home));
        }

        ProjectDirs::from("dev", "scour", "scour")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| Error::Config {
                message: "could not determine scour home directory".to_string(),
            })
    }
}
