//! Watches one directory for newly created files.
//!
//! notify delivers raw OS events on its own thread. They cross into async code
//! through a channel, and a single loop feeds them to a [`CreationTracker`]
//! which waits for each new file to go quiet before handing it to the
//! [`TaskQueue`]. Writers that create a file and then fill it produce one
//! `Create` followed by several `Modify` events; only the settled path is
//! dispatched, exactly once.

use super::loader::Document;
use super::task_queue::TaskQueue;
use anyhow::{Context, Result, bail};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, warn};

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub watch_dir: PathBuf,
    /// How long a new file must stay untouched before it is dispatched
    pub settle_delay: Duration,
    /// How often settled files are collected
    pub poll_interval: Duration,
    /// Queue files already present in the directory before watching
    pub scan_existing: bool,
}

impl WatcherSettings {
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            settle_delay: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            scan_existing: false,
        }
    }
}

/// Turns a stream of notify events into "this file was created and is done
/// being written" decisions.
#[derive(Debug)]
pub struct CreationTracker {
    settle_delay: Duration,
    pending: HashMap<PathBuf, Instant>,
    /// Files the initial scan already queued. A creation event for one of
    /// them that raced the scan must not queue it a second time.
    already_queued: HashSet<PathBuf>,
}

impl CreationTracker {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            settle_delay,
            pending: HashMap::new(),
            already_queued: HashSet::new(),
        }
    }

    /// Record that `path` was queued outside the tracker.
    pub fn mark_queued(&mut self, path: PathBuf) {
        self.already_queued.insert(path);
    }

    pub fn observe(&mut self, event: &Event, now: Instant) {
        match &event.kind {
            EventKind::Create(CreateKind::Folder) => {}
            EventKind::Create(_) => {
                for path in &event.paths {
                    self.register(path, now);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    self.register(path, now);
                }
            }
            // Renamed inside the folder: old name goes away, new name arrives
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    self.forget(from);
                    self.register(to, now);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    self.forget(path);
                }
            }
            // Some platforms cannot tell which side of a rename a path is on
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    if path.exists() {
                        self.register(path, now);
                    } else {
                        self.forget(path);
                    }
                }
            }
            EventKind::Modify(_) => {
                for path in &event.paths {
                    if let Some(last_seen) = self.pending.get_mut(path) {
                        *last_seen = now;
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.forget(path);
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }
    }

    fn register(&mut self, path: &Path, now: Instant) {
        if path.is_dir() {
            return;
        }
        self.pending.insert(path.to_path_buf(), now);
    }

    fn forget(&mut self, path: &Path) {
        self.pending.remove(path);
        self.already_queued.remove(path);
    }

    /// Remove and return every path that has been quiet for the settle delay.
    /// Paths that disappeared in the meantime, turned out to be directories,
    /// or were already queued by the initial scan are dropped.
    pub fn drain_settled(&mut self, now: Instant) -> Vec<PathBuf> {
        let settle_delay = self.settle_delay;
        let mut settled: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, last_seen)| now.saturating_duration_since(**last_seen) >= settle_delay)
            .map(|(path, _)| path.clone())
            .collect();

        for path in &settled {
            self.pending.remove(path);
        }
        settled.retain(|path| path.is_file() && !self.already_queued.remove(path));
        settled.sort();
        settled
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// A running watch on one directory.
pub struct DirectoryWatcher {
    watch_dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    listener: JoinHandle<()>,
}

impl DirectoryWatcher {
    /// Create the directory if needed and start watching it. Failing to set up
    /// the OS watch is an error; nothing is dispatched in that case. So is a
    /// watch path that already exists as something other than a directory.
    pub async fn start(settings: WatcherSettings, queue: TaskQueue) -> Result<Self> {
        let watch_dir = settings.watch_dir.clone();
        if tokio::fs::metadata(&watch_dir).await.is_ok_and(|m| !m.is_dir()) {
            bail!("Watch path {} is not a directory", watch_dir.display());
        }
        tokio::fs::create_dir_all(&watch_dir)
            .await
            .with_context(|| format!("Failed to create watch directory {}", watch_dir.display()))?;

        let (events_tx, events_rx) = mpsc::channel(1024);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Runs on notify's own thread, never inside the runtime. A send
            // error only means the listener has already stopped.
            let _ = events_tx.blocking_send(res);
        })
        .context("Failed to initialise file watcher")?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;
        info!("Watching {} for new documents", watch_dir.display());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let listener =
            tokio::spawn(Self::listen(settings, events_rx, shutdown_rx, queue).in_current_span());

        Ok(Self {
            watch_dir,
            watcher: Some(watcher),
            shutdown_tx: Some(shutdown_tx),
            listener,
        })
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Stop accepting events and release the OS watch. Files that were still
    /// settling are dropped; anything already queued keeps going.
    pub async fn shutdown(mut self) {
        drop(self.watcher.take());
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.listener).await {
            warn!("Watcher loop ended abnormally: {}", e);
        }
        info!("Stopped watching {}", self.watch_dir.display());
    }

    async fn listen(
        settings: WatcherSettings,
        mut events_rx: mpsc::Receiver<notify::Result<Event>>,
        mut shutdown_rx: oneshot::Receiver<()>,
        queue: TaskQueue,
    ) {
        let mut tracker = CreationTracker::new(settings.settle_delay);

        // Enqueue the initial scan before the events
        if settings.scan_existing {
            for path in scan_directory(&settings.watch_dir) {
                info!("Found existing file {}", path.display());
                tracker.mark_queued(path.clone());
                if queue.submit(Document::from_path(path)).await.is_err() {
                    warn!("Task queue closed during initial scan");
                    return;
                }
            }
        }

        let mut ticker = tokio::time::interval(settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                event = events_rx.recv() => match event {
                    Some(Ok(event)) => {
                        debug!("File event {:?} for {:?}", event.kind, event.paths);
                        tracker.observe(&event, Instant::now());
                    }
                    Some(Err(e)) => warn!("File watch error: {}", e),
                    None => break,
                },
                _ = ticker.tick() => {
                    for path in tracker.drain_settled(Instant::now()) {
                        info!("Detected new file {}", path.display());
                        if queue.submit(Document::from_path(path)).await.is_err() {
                            warn!("Task queue closed, stopping watcher");
                            return;
                        }
                    }
                }
            }
        }

        if tracker.pending_len() > 0 {
            debug!(
                "Dropping {} files that had not settled",
                tracker.pending_len()
            );
        }
    }
}

/// Regular files directly inside `dir`, honouring ignore files.
fn scan_directory(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = ignore::WalkBuilder::new(dir)
        .max_depth(Some(1))
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to read directory entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}
