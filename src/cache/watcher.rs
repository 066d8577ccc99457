//! File watcher feeding cache invalidation.
//!
//! Content changes to a file invalidate the module backed by it. Files
//! appearing, disappearing or moving also change the shape of the route
//! tree, so those additionally emit [`InvalidationEvent::RoutesChanged`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Modify,
    Remove,
    Rename,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Modify => "modify",
            ChangeKind::Remove => "remove",
            ChangeKind::Rename => "rename",
        }
    }

    /// Whether this change can alter which routes exist.
    pub fn is_structural(&self) -> bool {
        !matches!(self, ChangeKind::Modify)
    }
}

/// An instruction for the module cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    /// One file changed; drop the module it backs.
    Changed { kind: ChangeKind, path: PathBuf },
    /// The routing table is stale; drop everything.
    RoutesChanged,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Translate one filesystem notification into invalidation events.
pub fn events_for(event: &Event) -> Vec<InvalidationEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Create,
        EventKind::Remove(_) => ChangeKind::Remove,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Rename,
        EventKind::Modify(_) => ChangeKind::Modify,
        _ => return Vec::new(),
    };

    let mut events: Vec<InvalidationEvent> = event
        .paths
        .iter()
        .map(|path| InvalidationEvent::Changed {
            kind,
            path: path.clone(),
        })
        .collect();

    if kind.is_structural() && !events.is_empty() {
        events.push(InvalidationEvent::RoutesChanged);
    }
    events
}

/// Watches a source tree and reports invalidation events.
pub struct ModuleWatcher {
    root: PathBuf,
    poll_interval: Duration,
    events_tx: mpsc::UnboundedSender<InvalidationEvent>,
}

impl ModuleWatcher {
    /// Returns the watcher and the receiving end of its event stream.
    pub fn new(
        root: &Path,
        poll_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<InvalidationEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        (
            Self {
                root: root.to_path_buf(),
                poll_interval,
                events_tx,
            },
            events_rx,
        )
    }

    /// Start watching. Events flow for as long as the returned handle lives.
    pub fn run(self) -> Result<RecommendedWatcher, WatchError> {
        let tx = self.events_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for invalidation in events_for(&event) {
                        tracing::debug!(event = ?invalidation, "Source change detected");
                        if tx.send(invalidation).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )
        .map_err(|source| WatchError::Watch {
            path: self.root.clone(),
            source,
        })?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Watch {
                path: self.root.clone(),
                source,
            })?;

        tracing::info!(root = ?self.root, "Module watcher started");
        Ok(watcher)
    }
}
