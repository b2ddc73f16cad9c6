//! Filesystem watcher for plugin directories
//!
//! Watches a plugin directory with `notify` and forwards changes to the
//! subscribed listeners as [`DirChangeEvent`]s.

use crate::provider::{DirChangeListener, Listeners, PluginDirProvider};
use dirplug_api::{DirChangeEvent, DirChangeType};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Plugin directory provider backed by OS filesystem notifications
pub struct WatchedDirProvider {
    dir: PathBuf,
    listeners: Listeners,
    _watcher: Mutex<RecommendedWatcher>,
}

impl WatchedDirProvider {
    /// Start watching `dir`
    ///
    /// A directory that does not exist yet is not watched; scans still pick
    /// it up once it appears, through the scanner's rescan interval.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, WatcherError> {
        let dir = dir.into();
        let listeners = Listeners::default();

        let sink = listeners.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    for change in Self::translate(&event) {
                        sink.notify(&change);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Plugin directory watch error");
                }
            }
        })
        .map_err(WatcherError::Init)?;

        if dir.is_dir() {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(WatcherError::Init)?;
            tracing::info!(dir = %dir.display(), "Watching directory for plugins");
        } else {
            tracing::warn!(dir = %dir.display(), "Directory does not exist, not watching");
        }

        Ok(Self {
            dir,
            listeners,
            _watcher: Mutex::new(watcher),
        })
    }

    /// Map a notify event to directory change events, one per path
    fn translate(event: &Event) -> Vec<DirChangeEvent> {
        let change = match event.kind {
            EventKind::Create(_) => DirChangeType::Add,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => DirChangeType::Remove,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => DirChangeType::Add,
            EventKind::Modify(_) | EventKind::Any => DirChangeType::Update,
            EventKind::Remove(_) => DirChangeType::Remove,
            EventKind::Access(_) | EventKind::Other => return Vec::new(),
        };

        event
            .paths
            .iter()
            .map(|path| DirChangeEvent::new(Self::hint_for(path), change))
            .collect()
    }

    fn hint_for(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl PluginDirProvider for WatchedDirProvider {
    fn plugin_dir(&self) -> PathBuf {
        self.dir.clone()
    }

    fn subscribe(&self, listener: DirChangeListener) {
        self.listeners.push(listener);
    }
}

/// Errors that can occur during watching
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Failed to initialize watcher: {0}")]
    Init(#[source] notify::Error),
}
