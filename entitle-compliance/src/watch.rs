//! Event-driven change detection for local certificate directories.

use crate::error::ComplianceResult;
use crate::sources::ChangeWatcher;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use tracing::{debug, warn};

/// The local sources whose changes trigger a recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WatchKind {
    /// Installed product certificates.
    Product,
    /// Entitlement certificates.
    Entitlement,
    /// Consumer identity certificate.
    Consumer,
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Product => "product",
            Self::Entitlement => "entitlement",
            Self::Consumer => "consumer",
        })
    }
}

/// Watches one directory through OS file events, drained on each poll.
///
/// A directory that does not exist yet is watched through its parent until
/// it appears. Its creation counts as a change.
pub struct DirectoryWatch {
    path: PathBuf,
    watcher: RecommendedWatcher,
    receiver: Receiver<notify::Result<Event>>,
    watching_parent: bool,
}

impl DirectoryWatch {
    /// Starts watching `path`. Events before this call are not reported.
    ///
    /// Fails if neither `path` nor its parent directory exists, or if the
    /// platform watcher cannot be created.
    pub fn new(path: impl Into<PathBuf>) -> ComplianceResult<Self> {
        let path = resolve(path.into());
        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        let watching_parent = arm(&mut watcher, &path)?;

        Ok(Self {
            path,
            watcher,
            receiver: rx,
            watching_parent,
        })
    }

    /// The watched directory, with symlinks in existing components resolved.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true while the directory is missing and its parent is watched.
    #[must_use]
    pub fn is_watching_parent(&self) -> bool {
        self.watching_parent
    }

    fn is_relevant(&self, event: &Event) -> bool {
        matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) && event.paths.iter().any(|p| p.starts_with(&self.path))
    }

    /// Moves the watch between the directory and its parent after the
    /// directory appeared or vanished. Returns true if it did.
    fn rearm(&mut self) -> bool {
        let exists = self.path.is_dir();
        if exists != self.watching_parent {
            return false;
        }
        let stale = if self.watching_parent {
            self.path.parent().map(Path::to_path_buf)
        } else {
            Some(self.path.clone())
        };
        if let Some(stale) = stale {
            if let Err(e) = self.watcher.unwatch(&stale) {
                debug!(path = %stale.display(), error = %e, "Stale watch already gone");
            }
        }
        match arm(&mut self.watcher, &self.path) {
            Ok(watching_parent) => {
                debug!(path = %self.path.display(), watching_parent, "Re-armed directory watch");
                self.watching_parent = watching_parent;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to re-arm directory watch");
                self.watching_parent = !exists;
            }
        }
        true
    }
}

impl fmt::Debug for DirectoryWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryWatch")
            .field("path", &self.path)
            .field("watching_parent", &self.watching_parent)
            .finish_non_exhaustive()
    }
}

impl ChangeWatcher for DirectoryWatch {
    fn poll(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.receiver.try_recv() {
                Ok(Ok(event)) => changed |= self.is_relevant(&event),
                Ok(Err(e)) => warn!(path = %self.path.display(), error = %e, "File watch error"),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!(path = %self.path.display(), "File watch channel closed");
                    break;
                }
            }
        }
        changed |= self.rearm();
        if changed {
            debug!(path = %self.path.display(), "Directory contents changed");
        }
        changed
    }
}

/// Watches `path` if it is a directory, else its parent. Returns true when
/// the parent is watched.
fn arm(watcher: &mut RecommendedWatcher, path: &Path) -> notify::Result<bool> {
    if path.is_dir() {
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        return Ok(false);
    }
    match path.parent() {
        Some(parent) if parent.is_dir() => {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
            Ok(true)
        }
        _ => Err(notify::Error::path_not_found().add_path(path.to_path_buf())),
    }
}

/// Canonicalizes `path`, or its parent when `path` does not exist yet, so
/// that it matches the paths carried by platform events.
fn resolve(path: PathBuf) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let Some(name) = path.file_name().map(ToOwned::to_owned) else {
        return path;
    };
    match path.parent().map(Path::canonicalize) {
        Some(Ok(parent)) => parent.join(name),
        _ => path,
    }
}
