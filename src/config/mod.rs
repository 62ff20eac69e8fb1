//! Configuration management

mod schema;

pub use schema::{Config, GeneralConfig, WatchConfig};

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::processor::RescanPolicy;
use crate::rules::{Rule, RuleSet};

impl Config {
    /// Load configuration from a file or default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_path)
            .context("Could not determine config path")?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config from {}", config_path.display())
            })?;

            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file (with advisory file locking)
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_path)
            .context("Could not determine config path")?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // Use a lockfile to prevent concurrent writes
        let lock_path = config_path.with_extension("toml.lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;

        use fs2::FileExt;
        lock_file
            .lock_exclusive()
            .with_context(|| "Failed to acquire config file lock")?;

        let result = std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config to {}", config_path.display()));

        let _ = lock_file.unlock();

        result
    }

    /// Get the default config file path
    /// Uses the platform config directory (via dirs::config_dir), falling back to ~/.config
    pub fn default_path() -> Option<PathBuf> {
        let config_base =
            dirs::config_dir().or_else(|| dirs::home_dir().map(|d| d.join(".config")))?;
        Some(config_base.join("autosort").join("config.toml"))
    }

    /// Rules as the matcher sees them, with target folders expanded
    pub fn rule_set(&self) -> RuleSet {
        self.rules
            .iter()
            .map(|rule| Rule {
                target_dir: crate::expand_path(&rule.target_dir),
                ..rule.clone()
            })
            .collect()
    }

    /// Expanded watch folders, first occurrence wins on duplicates
    pub fn watch_folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = Vec::new();
        for watch in &self.watches {
            let path = crate::expand_path(&watch.path);
            if !folders.contains(&path) {
                folders.push(path);
            }
        }
        folders
    }

    pub fn rescan_policy(&self) -> RescanPolicy {
        RescanPolicy {
            rounds: self.general.rescan_rounds,
            delay: Duration::from_millis(self.general.rescan_delay_ms),
        }
    }

    /// Add a watch folder. Returns false if it is already watched.
    pub fn add_watch_folder(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.watches.iter().any(|w| w.path == path) {
            return false;
        }
        self.watches.push(WatchConfig { path });
        true
    }

    /// Remove a watch folder. Returns false if it was not watched.
    pub fn remove_watch_folder(&mut self, path: &Path) -> bool {
        let before = self.watches.len();
        self.watches.retain(|w| w.path != path);
        self.watches.len() != before
    }

    /// Append a rule at the end (lowest precedence)
    pub fn add_rule(&mut self, rule: Rule) -> Result<()> {
        if rule.target_dir.as_os_str().is_empty() {
            bail!("Rule has no target folder");
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Remove the rule at `index` (zero-based)
    pub fn remove_rule(&mut self, index: usize) -> Option<Rule> {
        if index < self.rules.len() {
            Some(self.rules.remove(index))
        } else {
            None
        }
    }

    /// Things that parse fine but probably do not do what the user expects
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut first_catch_all = None;

        for (i, rule) in self.rules.iter().enumerate() {
            let number = i + 1;
            if rule.is_exclude_only() {
                warnings.push(format!(
                    "rule {} has only exclude keywords: it never receives files and its \
                     exclude keywords block matching for every rule",
                    number
                ));
            }
            if rule.is_catch_all() {
                match first_catch_all {
                    None => first_catch_all = Some(number),
                    Some(first) => warnings.push(format!(
                        "rule {} is a catch-all but rule {} already catches everything",
                        number, first
                    )),
                }
            }
        }

        for folder in self.watch_folders() {
            if !folder.is_dir() {
                warnings.push(format!("watch folder does not exist: {}", folder.display()));
            }
        }

        warnings
    }
}
