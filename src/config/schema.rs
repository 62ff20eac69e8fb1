//! Configuration schema

use crate::processor::{DEFAULT_DELAY, DEFAULT_ROUNDS};
use crate::rules::Rule;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Watched folders
    #[serde(default, rename = "watch")]
    pub watches: Vec<WatchConfig>,

    /// Routing rules, in precedence order
    #[serde(default, rename = "rule")]
    pub rules: Vec<Rule>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to log file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// How many times a new directory is listed
    #[serde(default = "default_rescan_rounds")]
    pub rescan_rounds: u32,

    /// Milliseconds to wait before each listing of a new directory
    #[serde(default = "default_rescan_delay_ms")]
    pub rescan_delay_ms: u64,

    /// Enable desktop notifications for errors
    #[serde(default)]
    pub notifications_enabled: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            rescan_rounds: default_rescan_rounds(),
            rescan_delay_ms: default_rescan_delay_ms(),
            notifications_enabled: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rescan_rounds() -> u32 {
    DEFAULT_ROUNDS
}

fn default_rescan_delay_ms() -> u64 {
    DEFAULT_DELAY.as_millis() as u64
}

/// A watched folder. Only the folder itself is watched, not its subfolders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    pub path: PathBuf,
}
