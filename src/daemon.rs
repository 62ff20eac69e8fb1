//! AutoSort daemon (autosortd)
//!
//! Background service that watches the configured folders and copies
//! arriving files according to the rules.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autosort::{Config, Dispatcher, EventProcessor, SharedRules};

#[derive(Parser, Debug)]
#[command(name = "autosortd")]
#[command(author, version, about = "AutoSort background daemon")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run in the foreground (default)
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    init_logging(&config)?;
    autosort::notifications::init(config.general.notifications_enabled);

    match cli.command {
        None | Some(Commands::Run) => run_daemon(cli.config, config).await,
    }
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("AUTOSORT_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
    );

    let (file_layer, stderr_layer) = match &config.general.log_file {
        Some(path) => {
            let path = autosort::expand_path(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file));
            (Some(layer), None)
        }
        None => (None, Some(tracing_subscriber::fmt::layer().with_target(false))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

async fn run_daemon(config_path: Option<PathBuf>, config: Config) -> Result<()> {
    info!("autosortd {} starting", autosort::VERSION);
    info!(
        "Loaded config with {} watch folders and {} rules",
        config.watches.len(),
        config.rules.len()
    );
    for warning in config.validate() {
        warn!("Config: {}", warning);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let rules = SharedRules::new(config.rule_set());
    let processor = Arc::new(EventProcessor::new(
        rules.clone(),
        config.rescan_policy(),
        shutdown_rx,
    ));
    let stats = processor.stats();
    let dispatcher = Dispatcher::new(processor);

    let mut folders = config.watch_folders();
    if let Err(e) = dispatcher.restart(&folders).await {
        error!("Failed to start watching: {}", e);
    }

    let pid_file = autosort::pid_file_path();
    write_pid_file(&pid_file);

    info!("Daemon running. Press Ctrl+C to stop.");
    let mut signals = Signals::new()?;

    loop {
        match signals.next().await {
            DaemonSignal::Reload => {
                let config = match Config::load(config_path.as_deref()) {
                    Ok(config) => config,
                    Err(e) => {
                        error!("Reload failed, keeping current config: {:#}", e);
                        continue;
                    }
                };
                rules.replace(config.rule_set());
                info!("Reloaded {} rules", config.rules.len());

                autosort::notifications::init(config.general.notifications_enabled);
                let policy = config.rescan_policy();
                let processor = dispatcher.processor();
                if processor.policy() != policy {
                    info!(
                        "Rescan schedule changed: {} rounds every {:?}",
                        policy.rounds, policy.delay
                    );
                    processor.set_policy(policy);
                }

                let new_folders = config.watch_folders();
                if new_folders != folders {
                    folders = new_folders;
                    if let Err(e) = dispatcher.restart(&folders).await {
                        error!("Failed to restart watching: {}", e);
                    }
                }
            }
            DaemonSignal::Shutdown => break,
        }
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    dispatcher.stop().await;

    if let Err(e) = std::fs::remove_file(&pid_file) {
        warn!("Failed to remove PID file {}: {}", pid_file.display(), e);
    }

    info!(
        "Copied {} files ({} skipped, {} failed)",
        stats.copied(),
        stats.skipped(),
        stats.failed()
    );
    Ok(())
}

fn write_pid_file(path: &Path) {
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!("Failed to create {}: {}", parent.display(), e);
        return;
    }
    if let Err(e) = std::fs::write(path, std::process::id().to_string()) {
        warn!("Failed to write PID file {}: {}", path.display(), e);
    }
}

enum DaemonSignal {
    Reload,
    Shutdown,
}

#[cfg(unix)]
struct Signals {
    hangup: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn next(&mut self) -> DaemonSignal {
        tokio::select! {
            _ = self.hangup.recv() => DaemonSignal::Reload,
            _ = self.terminate.recv() => DaemonSignal::Shutdown,
            _ = tokio::signal::ctrl_c() => DaemonSignal::Shutdown,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> DaemonSignal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        DaemonSignal::Shutdown
    }
}
