//! Non-blocking watcher for a single directory level.
//!
//! The OS notification thread owned by `notify` decodes raw events into
//! [`ChangeEvent`]s and pushes them into a bounded queue; [`DirectoryWatcher::poll`]
//! drains whatever is ready without waiting. When a burst overflows the queue
//! the excess is dropped, so callers must treat events as a hint to re-check
//! the file rather than an exact transcript.

use std::path::{Path, PathBuf};

use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::WatcherError;

/// Number of decoded events held between two polls.
pub const WATCH_BUFFER_EVENTS: usize = 512;

/// What happened to a watched entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Added,
    Removed,
    Modified,
    RenamedOld,
    RenamedNew,
}

/// One raw change notification, valid for the poll that returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Name relative to the watched directory
    pub filename: String,
    pub action: ActionKind,
}

impl ChangeEvent {
    pub fn new(filename: impl Into<String>, action: ActionKind) -> Self {
        Self {
            filename: filename.into(),
            action,
        }
    }
}

struct ActiveWatch {
    watcher: RecommendedWatcher,
    root: PathBuf,
    event_rx: mpsc::Receiver<ChangeEvent>,
}

/// Watches the direct children of one directory for name and write-time changes.
#[derive(Default)]
pub struct DirectoryWatcher {
    active: Option<ActiveWatch>,
}

impl DirectoryWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin watching `path` (non-recursive).
    ///
    /// A watch that is already running is stopped first.
    pub fn start(&mut self, path: impl AsRef<Path>) -> Result<(), WatcherError> {
        if let Err(e) = self.stop() {
            warn!("restarting watcher: {e}");
        }

        let path = path.as_ref();
        let root = std::fs::canonicalize(path)
            .map_err(|e| WatcherError::CannotOpenDirectory(format!("{}: {e}", path.display())))?;
        if !root.is_dir() {
            return Err(WatcherError::CannotOpenDirectory(format!(
                "{}: not a directory",
                root.display()
            )));
        }

        let (event_tx, event_rx) = mpsc::channel(WATCH_BUFFER_EVENTS);
        let callback_root = root.clone();
        let mut watcher = recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in event_to_changes(&event, &callback_root) {
                    if event_tx.try_send(change).is_err() {
                        debug!("watch buffer full, dropping event");
                    }
                }
            }
            Err(e) => warn!("watch error: {e}"),
        })
        .map_err(|e| WatcherError::CannotOpenDirectory(e.to_string()))?;

        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::CannotOpenDirectory(format!("{}: {e}", root.display())))?;

        info!("watching {}", root.display());
        self.active = Some(ActiveWatch {
            watcher,
            root,
            event_rx,
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Directory being watched, if any.
    pub fn root(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.root.as_path())
    }

    /// Drain every event that is ready, in delivery order. Never blocks.
    pub fn poll(&mut self) -> Vec<ChangeEvent> {
        let mut changes = Vec::new();
        if let Some(active) = self.active.as_mut() {
            while let Ok(change) = active.event_rx.try_recv() {
                changes.push(change);
            }
        }
        changes
    }

    /// Release the OS watch. Safe to call when not running.
    ///
    /// The watcher is reset to not-running even when teardown reports an error.
    pub fn stop(&mut self) -> Result<(), WatcherError> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        match active.watcher.unwatch(&active.root) {
            Ok(()) => {
                info!("stopped watching {}", active.root.display());
                Ok(())
            }
            // The OS drops the watch by itself once the directory is gone.
            Err(e) if !active.root.exists() => {
                debug!("unwatch of removed {}: {e}", active.root.display());
                Ok(())
            }
            Err(e) => Err(WatcherError::TeardownFailed(e.to_string())),
        }
    }
}

/// Convert a `notify` event into zero or more changes relative to `root`.
///
/// Paths outside `root`, the root itself, nested paths and names that are
/// not valid UTF-8 are dropped.
pub fn event_to_changes(event: &Event, root: &Path) -> Vec<ChangeEvent> {
    let mut changes = Vec::new();
    let mut push = |path: &PathBuf, action: ActionKind| {
        if let Some(filename) = relative_name(path, root) {
            changes.push(ChangeEvent { filename, action });
        }
    };

    match &event.kind {
        EventKind::Create(_) => {
            for p in &event.paths {
                push(p, ActionKind::Added);
            }
        }
        EventKind::Remove(_) => {
            for p in &event.paths {
                push(p, ActionKind::Removed);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for p in &event.paths {
                push(p, ActionKind::RenamedOld);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for p in &event.paths {
                push(p, ActionKind::RenamedNew);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // rename carries (from, to)
            if let [from, to] = event.paths.as_slice() {
                push(from, ActionKind::RenamedOld);
                push(to, ActionKind::RenamedNew);
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Backends that cannot tell the two halves apart: decide by presence.
            for p in &event.paths {
                let action = if p.exists() {
                    ActionKind::RenamedNew
                } else {
                    ActionKind::RenamedOld
                };
                push(p, action);
            }
        }
        EventKind::Modify(ModifyKind::Metadata(kind))
            if !matches!(kind, MetadataKind::WriteTime | MetadataKind::Any) => {}
        EventKind::Modify(_) => {
            for p in &event.paths {
                push(p, ActionKind::Modified);
            }
        }
        _ => {}
    }
    changes
}

fn relative_name(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut components = rel.components();
    let first = components.next()?;
    if components.next().is_some() {
        return None;
    }
    first.as_os_str().to_str().map(str::to_owned)
}
