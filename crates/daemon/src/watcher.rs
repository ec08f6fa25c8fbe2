//! Recursive filesystem watcher feeding raw change events to the dispatcher.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::{CreateKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("provisioning path {} does not exist", .0.display())]
    MissingRoot(PathBuf),

    #[error("filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Kind of change observed on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    AddDir,
    Change,
    Unlink,
    UnlinkDir,
}

impl ChangeKind {
    /// Map a notify event kind; `None` for accesses and unclassified events.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(CreateKind::Folder) => Some(ChangeKind::AddDir),
            EventKind::Create(_) => Some(ChangeKind::Add),
            EventKind::Modify(_) => Some(ChangeKind::Change),
            EventKind::Remove(RemoveKind::Folder) => Some(ChangeKind::UnlinkDir),
            EventKind::Remove(_) => Some(ChangeKind::Unlink),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::AddDir => "addDir",
            ChangeKind::Change => "change",
            ChangeKind::Unlink => "unlink",
            ChangeKind::UnlinkDir => "unlinkDir",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw (kind, path) notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Split a notify event into one [`ChangeEvent`] per path.
pub fn change_events(event: &Event) -> Vec<ChangeEvent> {
    match ChangeKind::from_notify(&event.kind) {
        Some(kind) => event
            .paths
            .iter()
            .map(|p| ChangeEvent::new(kind, p.clone()))
            .collect(),
        None => Vec::new(),
    }
}

/// Keeps a recursive notify watcher alive; dropping it stops the stream.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl ChangeWatcher {
    /// Start watching `root` recursively, forwarding events into `tx`.
    ///
    /// The notify callback runs on the watcher's own thread and blocks on a
    /// full channel rather than dropping events.
    pub fn start(root: &Path, tx: mpsc::Sender<ChangeEvent>) -> Result<Self, WatchError> {
        if !root.exists() {
            return Err(WatchError::MissingRoot(root.to_path_buf()));
        }

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                for change in change_events(&event) {
                    debug!(kind = %change.kind, path = %change.path.display(), "filesystem change");
                    if tx.blocking_send(change).is_err() {
                        // Receiver gone: the daemon is shutting down.
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "filesystem watcher error"),
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        info!(path = %root.display(), "watching provisioning directory (recursive)");

        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
