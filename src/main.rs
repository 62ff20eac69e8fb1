//! AutoSort command line
//!
//! Edits the watch folders and rules, and inspects routing decisions.

use anyhow::{Context, Result};
use autosort::rules::{self, Decision, MatchPass, Rule};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "autosort")]
#[command(author, version, about = "Copies new files into folders chosen by keyword rules")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List watch folders and rules
    List,

    /// Validate config file
    Check,

    /// Show which rule a file would be routed by, without copying
    Route {
        /// File to evaluate
        file: PathBuf,
    },

    /// Route the files currently in the watch folders once (dry-run by default)
    Run {
        /// Actually copy files (not just dry-run)
        #[arg(long)]
        apply: bool,

        /// Process this directory instead of the watch folders
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Manage watch folders
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Manage rules
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Show daemon status
    Status,

    /// Ask the running daemon to reload its configuration
    Reload,
}

#[derive(clap::Subcommand, Debug)]
enum FolderAction {
    /// Watch a folder
    Add { path: PathBuf },
    /// Stop watching a folder
    Remove { path: PathBuf },
}

#[derive(clap::Subcommand, Debug)]
enum RuleAction {
    /// Append a rule (lowest precedence)
    Add {
        /// Comma-separated keywords, any of which must appear in the file name
        #[arg(short, long, value_delimiter = ',')]
        include: Vec<String>,

        /// Comma-separated keywords that block the file (checked against name and path)
        #[arg(short, long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Destination folder
        #[arg(short, long)]
        target: PathBuf,
    },
    /// Remove the rule with the given number (as shown by `list`)
    Remove { number: usize },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("AUTOSORT_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::List => {
            let config = autosort::Config::load(config_path)?;
            println!("Watch folders:");
            if config.watches.is_empty() {
                println!("  (none)");
            }
            for watch in &config.watches {
                println!("  {}", watch.path.display());
            }
            println!("Rules:");
            if config.rules.is_empty() {
                println!("  (none)");
            }
            for (i, rule) in config.rules.iter().enumerate() {
                println!("  [{}] {}", i + 1, rule.summary());
            }
        }
        Commands::Check => match autosort::Config::load(config_path) {
            Ok(config) => {
                println!("✓ Config is valid");
                println!("  {} watch folders", config.watches.len());
                println!("  {} rules", config.rules.len());
                for warning in config.validate() {
                    println!("  ⚠ {}", warning);
                }
            }
            Err(e) => {
                eprintln!("✗ Config error: {:#}", e);
                std::process::exit(1);
            }
        },
        Commands::Route { file } => {
            let config = autosort::Config::load(config_path)?;
            let file = std::path::absolute(&file).unwrap_or(file);
            println!("{}: {}", file.display(), describe(&rules::decide(&file, &config.rule_set())));
        }
        Commands::Run { apply, dir } => {
            let config = autosort::Config::load(config_path)?;
            let rule_set = config.rule_set();
            let dirs = match dir {
                Some(d) => vec![d],
                None => config.watch_folders(),
            };

            for dir in dirs {
                println!("Processing: {}", dir.display());
                run_once(&dir, &rule_set, apply)?;
            }
        }
        Commands::Folder { action } => {
            let mut config = autosort::Config::load(config_path)?;
            match action {
                FolderAction::Add { path } => {
                    let path = std::path::absolute(&path).unwrap_or(path);
                    if config.add_watch_folder(&path) {
                        config.save(config_path)?;
                        println!("Watching {}", path.display());
                    } else {
                        println!("Already watching {}", path.display());
                    }
                }
                FolderAction::Remove { path } => {
                    if config.remove_watch_folder(&path) {
                        config.save(config_path)?;
                        println!("Stopped watching {}", path.display());
                    } else {
                        anyhow::bail!("Not a watch folder: {}", path.display());
                    }
                }
            }
            print_reload_hint();
        }
        Commands::Rule { action } => {
            let mut config = autosort::Config::load(config_path)?;
            match action {
                RuleAction::Add {
                    include,
                    exclude,
                    target,
                } => {
                    let rule = Rule::new(clean(include), clean(exclude), target);
                    let summary = rule.summary();
                    config.add_rule(rule)?;
                    config.save(config_path)?;
                    println!("Added rule [{}] {}", config.rules.len(), summary);
                }
                RuleAction::Remove { number } => {
                    let removed = number
                        .checked_sub(1)
                        .and_then(|index| config.remove_rule(index))
                        .with_context(|| format!("No rule number {}", number))?;
                    config.save(config_path)?;
                    println!("Removed rule: {}", removed.summary());
                }
            }
            print_reload_hint();
        }
        Commands::Status => show_daemon_status(),
        Commands::Reload => reload_daemon()?,
    }

    Ok(())
}

fn clean(keywords: Vec<String>) -> Vec<String> {
    keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn describe(decision: &Decision) -> String {
    match decision {
        Decision::Unsupported => format!(
            "unsupported file type (accepted: {})",
            rules::SUPPORTED_EXTENSIONS.join(", ")
        ),
        Decision::Vetoed { keyword } => format!("blocked by exclude keyword '{}'", keyword),
        Decision::NoMatch => "no rule matches".to_string(),
        Decision::Routed {
            rule_index,
            pass,
            target_dir,
        } => {
            let how = match pass {
                MatchPass::Include => "include keywords",
                MatchPass::CatchAll => "catch-all",
            };
            format!(
                "rule [{}] ({}) -> {}",
                rule_index + 1,
                how,
                target_dir.display()
            )
        }
    }
}

fn dry_run_line(path: &Path, decision: &Decision) -> String {
    format!("[dry-run] {}: {}", path.display(), describe(decision))
}

fn run_once(dir: &Path, rule_set: &autosort::RuleSet, apply: bool) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let decision = rules::decide(&path, rule_set);
        let Some(target) = decision.target_dir() else {
            continue;
        };
        if apply {
            match rules::copy_into(&path, target) {
                Ok(dest) => println!("  Copied: {} -> {}", path.display(), dest.display()),
                Err(e) => eprintln!("  Failed: {}", e),
            }
        } else {
            println!("  {}", dry_run_line(&path, &decision));
        }
    }
    Ok(())
}

fn print_reload_hint() {
    #[cfg(unix)]
    if autosort::running_daemon_pid().is_some() {
        println!("Run `autosort reload` to apply the change to the running daemon");
    }
}

#[cfg(unix)]
fn show_daemon_status() {
    match autosort::running_daemon_pid() {
        Some(pid) => {
            println!("AutoSort daemon is running");
            println!("   PID: {}", pid);
            println!("   PID file: {}", autosort::pid_file_path().display());
        }
        None => println!("AutoSort daemon is not running"),
    }
}

#[cfg(not(unix))]
fn show_daemon_status() {
    println!("Daemon status is only available on Unix systems");
}

#[cfg(unix)]
fn reload_daemon() -> Result<()> {
    let pid = autosort::running_daemon_pid().context("AutoSort daemon is not running")?;
    if unsafe { libc::kill(pid, libc::SIGHUP) } != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("Failed to signal daemon (PID {})", pid));
    }
    println!("Reload requested (PID {})", pid);
    Ok(())
}

#[cfg(not(unix))]
fn reload_daemon() -> Result<()> {
    anyhow::bail!("Reload is only supported on Unix systems; restart autosortd instead")
}
