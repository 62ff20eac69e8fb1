//! Event processing - turns filesystem events into routed copies

mod rescan;

pub use rescan::{
    DEFAULT_DELAY, DEFAULT_ROUNDS, RescanMachine, RescanPolicy, RescanState, RescanStep, Sleeper,
    TokioSleeper,
};

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

use crate::rules::{CopyError, Decision, SharedRules, copy_into, decide};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Create,
    Move,
}

/// A create or move event as delivered by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub is_directory: bool,
    /// Created path, or the source of a move (the destination again when
    /// the backend does not report the source)
    pub path: PathBuf,
    /// Destination of a move
    pub dest_path: Option<PathBuf>,
}

impl RawEvent {
    pub fn created(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            kind: RawEventKind::Create,
            is_directory,
            path: path.into(),
            dest_path: None,
        }
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            kind: RawEventKind::Move,
            is_directory,
            path: from.into(),
            dest_path: Some(to.into()),
        }
    }

    /// Where the file or directory now lives
    pub fn arrival_path(&self) -> &Path {
        match (self.kind, &self.dest_path) {
            (RawEventKind::Move, Some(dest)) => dest,
            _ => &self.path,
        }
    }
}

/// A single file discovered by an event or a rescan
#[derive(Debug, Clone)]
pub struct FileArrival {
    pub path: PathBuf,
    pub discovered_at: DateTime<Local>,
}

impl FileArrival {
    fn now(path: PathBuf) -> Self {
        Self {
            path,
            discovered_at: Local::now(),
        }
    }
}

/// What happened to one file. Every variant is non-fatal.
#[derive(Debug)]
pub enum FileOutcome {
    Unsupported,
    Vetoed { keyword: String },
    NoMatch,
    Copied { rule_index: usize, destination: PathBuf },
    Failed(CopyError),
}

#[derive(Debug)]
pub struct FileReport {
    pub arrival: FileArrival,
    pub outcome: FileOutcome,
}

/// Running totals across all processed files
#[derive(Debug, Default)]
pub struct ProcessorStats {
    copied: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl ProcessorStats {
    fn record(&self, outcome: &FileOutcome) {
        let counter = match outcome {
            FileOutcome::Copied { .. } => &self.copied,
            FileOutcome::Failed(_) => &self.failed,
            _ => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn copied(&self) -> u64 {
        self.copied.load(Ordering::Relaxed)
    }

    /// Unsupported, vetoed, or unmatched files
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Size and mtime, used to skip files that did not change between rescans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl From<&std::fs::Metadata> for Fingerprint {
    fn from(metadata: &std::fs::Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// Applies the current rule set to incoming events
pub struct EventProcessor<S = TokioSleeper> {
    rules: SharedRules,
    policy: watch::Sender<RescanPolicy>,
    sleeper: S,
    stats: Arc<ProcessorStats>,
    shutdown: watch::Receiver<bool>,
}

impl EventProcessor<TokioSleeper> {
    pub fn new(rules: SharedRules, policy: RescanPolicy, shutdown: watch::Receiver<bool>) -> Self {
        Self::with_sleeper(rules, policy, shutdown, TokioSleeper)
    }
}

impl<S: Sleeper> EventProcessor<S> {
    pub fn with_sleeper(
        rules: SharedRules,
        policy: RescanPolicy,
        shutdown: watch::Receiver<bool>,
        sleeper: S,
    ) -> Self {
        Self {
            rules,
            policy: watch::Sender::new(policy),
            sleeper,
            stats: Arc::new(ProcessorStats::default()),
            shutdown,
        }
    }

    pub fn stats(&self) -> Arc<ProcessorStats> {
        Arc::clone(&self.stats)
    }

    pub fn policy(&self) -> RescanPolicy {
        *self.policy.borrow()
    }

    /// Rescan schedule for directories that arrive from now on
    pub fn set_policy(&self, policy: RescanPolicy) {
        self.policy.send_replace(policy);
    }

    /// Handle one create/move event.
    ///
    /// Files are processed directly. Directories are rescanned on the
    /// configured schedule since they may still be receiving files.
    pub async fn handle(&self, event: RawEvent) -> Vec<FileReport> {
        let path = event.arrival_path().to_path_buf();
        debug!("{:?} event for {}", event.kind, path.display());

        if event.is_directory {
            self.rescan_directory(&path).await
        } else {
            vec![self.process_file(path).await]
        }
    }

    /// Gate, route and copy a single file
    pub async fn process_file(&self, path: PathBuf) -> FileReport {
        let arrival = FileArrival::now(path);
        let rules = self.rules.snapshot();

        let outcome = match decide(&arrival.path, &rules) {
            Decision::Unsupported => FileOutcome::Unsupported,
            Decision::Vetoed { keyword } => FileOutcome::Vetoed { keyword },
            Decision::NoMatch => FileOutcome::NoMatch,
            Decision::Routed {
                rule_index,
                target_dir,
                ..
            } => {
                let source = arrival.path.clone();
                match tokio::task::spawn_blocking(move || copy_into(&source, &target_dir)).await {
                    Ok(Ok(destination)) => FileOutcome::Copied {
                        rule_index,
                        destination,
                    },
                    Ok(Err(e)) => FileOutcome::Failed(e),
                    Err(e) => FileOutcome::Failed(CopyError::Aborted {
                        path: arrival.path.clone(),
                        reason: e.to_string(),
                    }),
                }
            }
        };

        log_outcome(&arrival, &outcome);
        self.stats.record(&outcome);

        FileReport { arrival, outcome }
    }

    async fn rescan_directory(&self, dir: &Path) -> Vec<FileReport> {
        info!("Directory arrived, rescanning: {}", dir.display());

        let policy = self.policy();
        let mut machine = RescanMachine::new(policy);
        let mut seen: IndexMap<PathBuf, Fingerprint> = IndexMap::new();
        let mut reports = Vec::new();

        loop {
            match machine.advance() {
                RescanStep::Wait(delay) => {
                    let mut shutdown = self.shutdown.clone();
                    tokio::select! {
                        _ = self.sleeper.sleep(delay) => {}
                        _ = shutdown_requested(&mut shutdown) => {
                            debug!("Shutdown during rescan of {}", dir.display());
                            machine.cancel();
                        }
                    }
                }
                RescanStep::Scan { round } => {
                    if *self.shutdown.borrow() {
                        machine.cancel();
                        continue;
                    }

                    let listing = list_files(dir).await;
                    debug!(
                        "Rescan {}/{} of {}: {} files",
                        round,
                        policy.rounds,
                        dir.display(),
                        listing.len()
                    );

                    for (path, fingerprint) in listing {
                        if seen.get(&path) == Some(&fingerprint) {
                            trace!("Unchanged since last rescan: {}", path.display());
                            continue;
                        }
                        let report = self.process_file(path.clone()).await;
                        if !matches!(report.outcome, FileOutcome::Failed(_)) {
                            seen.insert(path, fingerprint);
                        }
                        reports.push(report);
                    }
                }
                RescanStep::Done => break,
            }
        }

        reports
    }
}

fn log_outcome(arrival: &FileArrival, outcome: &FileOutcome) {
    let path = arrival.path.display();
    match outcome {
        FileOutcome::Unsupported => info!("Unsupported file type, skipping: {}", path),
        FileOutcome::Vetoed { keyword } => {
            info!("Exclude keyword '{}' matched, not copying: {}", keyword, path)
        }
        FileOutcome::NoMatch => info!("No rule matched: {}", path),
        FileOutcome::Copied {
            rule_index,
            destination,
        } => info!(
            "Copied {} -> {} (rule #{})",
            path,
            destination.display(),
            rule_index + 1
        ),
        FileOutcome::Failed(e) if e.is_not_found() => {
            error!("Source vanished before it could be copied: {}", path);
            crate::notifications::notify_copy_error(&arrival.path.to_string_lossy(), &e.to_string());
        }
        FileOutcome::Failed(e) => {
            error!("Copy failed for {}: {}", path, e);
            crate::notifications::notify_copy_error(&arrival.path.to_string_lossy(), &e.to_string());
        }
    }
}

/// Resolves once shutdown is requested; never resolves if the sender is gone
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn list_files(dir: &Path) -> Vec<(PathBuf, Fingerprint)> {
    let dir = dir.to_path_buf();
    match tokio::task::spawn_blocking(move || walk_files(&dir)).await {
        Ok(files) => files,
        Err(e) => {
            error!("Directory listing task failed: {}", e);
            Vec::new()
        }
    }
}

/// All regular files under `dir`, recursively. Symlinks are not followed.
fn walk_files(dir: &Path) -> Vec<(PathBuf, Fingerprint)> {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to list {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let fingerprint = Fingerprint::from(&entry.metadata().ok()?);
            Some((entry.into_path(), fingerprint))
        })
        .collect()
}
