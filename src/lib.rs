//! AutoSort - keyword-routed file copier
//!
//! Watches folders for newly created or moved-in files and copies each
//! supported file into the destination chosen by an ordered list of
//! keyword rules.

pub mod config;
pub mod notifications;
pub mod processor;
pub mod rules;
pub mod watcher;

pub use config::Config;
pub use processor::{EventProcessor, FileOutcome, RawEvent, RescanPolicy};
pub use rules::{Decision, Rule, RuleSet, SharedRules};
pub use watcher::{Dispatcher, WatchSession};

use std::path::PathBuf;

/// Current version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Expand ~ and environment variables ($VAR, ${VAR}) in a path
pub fn expand_path(path: &std::path::Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    // First expand ~ prefix
    let expanded = if let Some(stripped) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            home.join(stripped).to_string_lossy().to_string()
        } else {
            path_str.to_string()
        }
    } else if path_str == "~" {
        if let Some(home) = dirs::home_dir() {
            home.to_string_lossy().to_string()
        } else {
            path_str.to_string()
        }
    } else {
        path_str.to_string()
    };

    // Then expand $VAR and ${VAR} patterns
    use std::sync::LazyLock;
    static ENV_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("invalid env regex")
    });

    let result = ENV_RE.replace_all(&expanded, |caps: &regex::Captures| {
        let var_name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(result.as_ref())
}

/// Where the daemon records its PID
pub fn pid_file_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::state_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("autosortd.pid")
}

/// PID of the running daemon, if its PID file points at a live process
#[cfg(unix)]
pub fn running_daemon_pid() -> Option<i32> {
    let pid: i32 = std::fs::read_to_string(pid_file_path())
        .ok()?
        .trim()
        .parse()
        .ok()?;
    // Signal 0 only checks that the process exists
    (unsafe { libc::kill(pid, 0) } == 0).then_some(pid)
}
