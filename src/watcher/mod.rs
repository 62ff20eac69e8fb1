//! File system watcher

mod handler;

pub use handler::normalize;

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::processor::{EventProcessor, Sleeper, TokioSleeper};

type NotifyResult = Result<notify::Event, notify::Error>;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to start file watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("watch folder does not exist: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to watch {}: {source}", .path.display())]
    Folder {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// A running watch over a fixed set of folders.
///
/// Each folder is watched non-recursively. Every arrival is handled on its
/// own task so a directory rescan never holds up other events.
pub struct WatchSession {
    watcher: RecommendedWatcher,
    pump: JoinHandle<()>,
    stop: oneshot::Sender<()>,
    folders: Vec<PathBuf>,
}

impl WatchSession {
    /// Start watching `folders`. Folders that cannot be watched are logged
    /// and skipped; only a failure to create the watcher itself is an error.
    pub fn start<S: Sleeper>(
        folders: &[PathBuf],
        processor: Arc<EventProcessor<S>>,
    ) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel::<NotifyResult>();

        let mut watcher = RecommendedWatcher::new(
            move |res: NotifyResult| {
                if tx.send(res).is_err() {
                    debug!("Watch session closed, dropping event");
                }
            },
            Config::default(),
        )
        .map_err(WatchError::Init)?;

        let mut watched = Vec::new();
        for folder in folders {
            match watch_folder(&mut watcher, folder) {
                Ok(()) => {
                    info!("Watching: {}", folder.display());
                    watched.push(folder.clone());
                }
                Err(e) => {
                    error!("{}", e);
                    crate::notifications::notify_watch_error(
                        &folder.to_string_lossy(),
                        &e.to_string(),
                    );
                }
            }
        }

        let (stop, stop_rx) = oneshot::channel();
        let pump = tokio::spawn(pump_events(rx, stop_rx, processor));

        Ok(Self {
            watcher,
            pump,
            stop,
            folders: watched,
        })
    }

    /// Folders that are actually being watched
    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    /// Stop receiving events and wait for in-flight handlers to finish
    pub async fn stop(self) {
        let Self {
            watcher,
            pump,
            stop,
            ..
        } = self;
        drop(watcher);
        let _ = stop.send(());
        if let Err(e) = pump.await {
            error!("Watch event pump failed: {}", e);
        }
    }
}

fn watch_folder(watcher: &mut RecommendedWatcher, folder: &Path) -> Result<(), WatchError> {
    if !folder.is_dir() {
        return Err(WatchError::Missing(folder.to_path_buf()));
    }
    watcher
        .watch(folder, RecursiveMode::NonRecursive)
        .map_err(|source| WatchError::Folder {
            path: folder.to_path_buf(),
            source,
        })
}

async fn pump_events<S: Sleeper>(
    mut rx: mpsc::UnboundedReceiver<NotifyResult>,
    mut stop: oneshot::Receiver<()>,
    processor: Arc<EventProcessor<S>>,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(Ok(event)) => {
                    for raw in normalize(&event) {
                        let processor = Arc::clone(&processor);
                        tasks.spawn(async move {
                            processor.handle(raw).await;
                        });
                    }
                }
                Some(Err(e)) => error!("Watch error: {}", e),
                None => break,
            },
            _ = &mut stop => break,
        }

        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                error!("Event handler task failed: {}", e);
            }
        }
    }

    while let Some(done) = tasks.join_next().await {
        if let Err(e) = done {
            error!("Event handler task failed: {}", e);
        }
    }
    debug!("Watch event pump stopped");
}

/// Owns the watch session and rebuilds it whenever the folder set changes.
///
/// Restarts are serialized: a restart stops and joins the old session before
/// the new one starts.
pub struct Dispatcher<S = TokioSleeper> {
    processor: Arc<EventProcessor<S>>,
    session: Mutex<Option<WatchSession>>,
}

impl<S: Sleeper> Dispatcher<S> {
    pub fn new(processor: Arc<EventProcessor<S>>) -> Self {
        Self {
            processor,
            session: Mutex::new(None),
        }
    }

    pub fn processor(&self) -> &Arc<EventProcessor<S>> {
        &self.processor
    }

    /// Replace the running session with one watching `folders`
    pub async fn restart(&self, folders: &[PathBuf]) -> Result<(), WatchError> {
        let mut session = self.session.lock().await;

        if let Some(old) = session.take() {
            info!("Stopping watch session");
            old.stop().await;
        }

        let new = WatchSession::start(folders, Arc::clone(&self.processor))?;
        info!(
            "Watch session started: {} of {} folders",
            new.folders().len(),
            folders.len()
        );
        *session = Some(new);
        Ok(())
    }

    /// Stop the running session, if any
    pub async fn stop(&self) {
        if let Some(old) = self.session.lock().await.take() {
            old.stop().await;
            info!("Watch session stopped");
        }
    }

    /// Folders watched by the current session
    pub async fn watched_folders(&self) -> Vec<PathBuf> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.folders().to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::RescanPolicy;
    use crate::rules::{Rule, RuleSet, SharedRules};
    use std::future::Future;
    use std::time::Duration;
    use tokio::sync::{Notify, watch};

    /// Signals each time a rescan starts waiting; waits for real or forever
    struct SignalSleeper {
        started: Arc<Notify>,
        wakes: bool,
    }

    impl Sleeper for SignalSleeper {
        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            self.started.notify_one();
            let wakes = self.wakes;
            async move {
                if wakes {
                    tokio::time::sleep(duration).await;
                } else {
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    fn signal_dispatcher(
        target: &Path,
        wakes: bool,
    ) -> (Dispatcher<SignalSleeper>, watch::Sender<bool>, Arc<Notify>) {
        let (tx, rx) = watch::channel(false);
        let started = Arc::new(Notify::new());
        let sleeper = SignalSleeper {
            started: Arc::clone(&started),
            wakes,
        };
        let rules = SharedRules::new(RuleSet::new(vec![Rule::new(vec![], vec![], target)]));
        let policy = RescanPolicy {
            rounds: 3,
            delay: Duration::from_millis(100),
        };
        let processor = Arc::new(EventProcessor::with_sleeper(rules, policy, rx, sleeper));
        (Dispatcher::new(processor), tx, started)
    }

    /// Build `name` outside the watched folder, then move it in
    fn move_in(staging: &Path, watched: &Path, name: &str, files: &[(&str, &str)]) {
        let staged = staging.join(name);
        for (relative, contents) in files {
            let file = staged.join(relative);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, contents).unwrap();
        }
        std::fs::rename(&staged, watched.join(name)).unwrap();
    }

    fn dispatcher(target: &Path) -> (Dispatcher, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let rules = SharedRules::new(RuleSet::new(vec![Rule::new(vec![], vec![], target)]));
        let policy = RescanPolicy {
            rounds: 3,
            delay: Duration::from_millis(50),
        };
        let processor = Arc::new(EventProcessor::new(rules, policy, rx));
        (Dispatcher::new(processor), tx)
    }

    async fn wait_for(path: &Path) -> bool {
        for _ in 0..100 {
            if path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_missing_folder_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let present = temp.path().join("present");
        std::fs::create_dir(&present).unwrap();
        let missing = temp.path().join("missing");
        let (dispatcher, _tx) = dispatcher(&temp.path().join("out"));

        dispatcher
            .restart(&[present.clone(), missing.clone()])
            .await
            .unwrap();

        assert_eq!(dispatcher.watched_folders().await, vec![present]);
        dispatcher.stop().await;
        assert!(dispatcher.watched_folders().await.is_empty());
    }

    #[tokio::test]
    async fn test_restart_replaces_folder_set() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        std::fs::create_dir(&a).unwrap();
        std::fs::create_dir(&b).unwrap();
        let (dispatcher, _tx) = dispatcher(&temp.path().join("out"));

        dispatcher.restart(&[a.clone()]).await.unwrap();
        dispatcher.restart(&[b.clone()]).await.unwrap();

        assert_eq!(dispatcher.watched_folders().await, vec![b]);
        dispatcher.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_file_moved_into_watched_folder_is_copied() {
        let temp = tempfile::tempdir().unwrap();
        let watched = temp.path().join("watch");
        std::fs::create_dir(&watched).unwrap();
        let out = temp.path().join("out");
        let (dispatcher, _tx) = dispatcher(&out);
        dispatcher.restart(&[watched.clone()]).await.unwrap();

        let staged = temp.path().join("part.stl");
        std::fs::write(&staged, "solid").unwrap();
        std::fs::rename(&staged, watched.join("part.stl")).unwrap();

        assert!(wait_for(&out.join("part.stl")).await);
        dispatcher.stop().await;
        assert_eq!(std::fs::read_to_string(out.join("part.stl")).unwrap(), "solid");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_directory_moved_into_watched_folder_is_rescanned() {
        let temp = tempfile::tempdir().unwrap();
        let watched = temp.path().join("watch");
        std::fs::create_dir(&watched).unwrap();
        let out = temp.path().join("out");
        let (dispatcher, _tx) = dispatcher(&out);
        dispatcher.restart(&[watched.clone()]).await.unwrap();

        let staged = temp.path().join("batch");
        std::fs::create_dir_all(staged.join("inner")).unwrap();
        std::fs::write(staged.join("inner/deep.pts"), "points").unwrap();
        std::fs::rename(&staged, watched.join("batch")).unwrap();

        assert!(wait_for(&out.join("deep.pts")).await);
        dispatcher.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_rescan_does_not_block_other_events() {
        let temp = tempfile::tempdir().unwrap();
        let watched = temp.path().join("watch");
        let staging = temp.path().join("staging");
        std::fs::create_dir(&watched).unwrap();
        std::fs::create_dir(&staging).unwrap();
        let out = temp.path().join("out");
        let (dispatcher, shutdown, started) = signal_dispatcher(&out, false);
        dispatcher.restart(&[watched.clone()]).await.unwrap();

        move_in(&staging, &watched, "batch", &[("held.stl", "held")]);
        tokio::time::timeout(Duration::from_secs(5), started.notified())
            .await
            .expect("directory rescan should start");

        let staged = staging.join("part.stl");
        std::fs::write(&staged, "solid").unwrap();
        std::fs::rename(&staged, watched.join("part.stl")).unwrap();

        assert!(wait_for(&out.join("part.stl")).await);
        assert!(!out.join("held.stl").exists());

        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), dispatcher.stop())
            .await
            .expect("stop should cancel the pending rescan");
        assert!(!out.join("held.stl").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_restarts_leave_one_session() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let staging = temp.path().join("staging");
        for dir in [&a, &b, &staging] {
            std::fs::create_dir(dir).unwrap();
        }
        let out = temp.path().join("out");
        let (dispatcher, _tx) = dispatcher(&out);

        let (first, second) = tokio::join!(
            dispatcher.restart(std::slice::from_ref(&a)),
            dispatcher.restart(std::slice::from_ref(&b))
        );
        first.unwrap();
        second.unwrap();

        let current = dispatcher.watched_folders().await;
        assert_eq!(current.len(), 1);
        let (live, stale) = if current[0] == a { (&a, &b) } else { (&b, &a) };

        move_in(&staging, stale, "stale", &[("stale.stl", "x")]);
        move_in(&staging, live, "live", &[("live.stl", "y")]);

        assert!(wait_for(&out.join("live.stl")).await);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!out.join("stale.stl").exists());
        dispatcher.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_waits_for_in_flight_rescan() {
        let temp = tempfile::tempdir().unwrap();
        let watched = temp.path().join("watch");
        let staging = temp.path().join("staging");
        std::fs::create_dir(&watched).unwrap();
        std::fs::create_dir(&staging).unwrap();
        let out = temp.path().join("out");
        let (dispatcher, _tx, started) = signal_dispatcher(&out, true);
        dispatcher.restart(&[watched.clone()]).await.unwrap();

        move_in(&staging, &watched, "batch", &[("inner/deep.pts", "points")]);
        tokio::time::timeout(Duration::from_secs(5), started.notified())
            .await
            .expect("directory rescan should start");

        dispatcher.stop().await;

        assert_eq!(
            std::fs::read_to_string(out.join("deep.pts")).unwrap(),
            "points"
        );
    }
}
