//! Plugin directory providers
//!
//! A provider tells the scanner where plugins live and notifies it when
//! the directory changes.

use dirplug_api::{DirChangeEvent, DirChangeType};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Callback invoked for every change in a plugin directory
pub type DirChangeListener = Box<dyn Fn(&DirChangeEvent) + Send + Sync>;

/// Source of the plugin directory and its change notifications
pub trait PluginDirProvider: Send + Sync {
    /// Directory to scan
    fn plugin_dir(&self) -> PathBuf;

    /// Register a listener for change notifications
    fn subscribe(&self, listener: DirChangeListener);
}

/// A fixed directory that never reports changes
#[derive(Debug, Clone)]
pub struct StaticDirProvider {
    dir: PathBuf,
}

impl StaticDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PluginDirProvider for StaticDirProvider {
    fn plugin_dir(&self) -> PathBuf {
        self.dir.clone()
    }

    fn subscribe(&self, _listener: DirChangeListener) {}
}

/// Listener list shared between a provider and its event source
#[derive(Clone, Default)]
pub(crate) struct Listeners {
    inner: Arc<RwLock<Vec<DirChangeListener>>>,
}

impl Listeners {
    pub(crate) fn push(&self, listener: DirChangeListener) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub(crate) fn notify(&self, event: &DirChangeEvent) {
        let listeners = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A fixed directory whose change notifications are fired by the caller
///
/// Useful when changes are learned about by other means, such as an
/// install command writing into the plugin directory.
#[derive(Clone)]
pub struct ManualDirProvider {
    dir: PathBuf,
    listeners: Listeners,
}

impl ManualDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            listeners: Listeners::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deliver `event` to every listener
    pub fn fire(&self, event: DirChangeEvent) {
        tracing::debug!(hint = %event.hint, change = ?event.change, "Plugin directory changed");
        self.listeners.notify(&event);
    }

    /// Deliver a generic update event
    pub fn fire_change(&self) {
        self.fire(DirChangeEvent::new("", DirChangeType::Update));
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl PluginDirProvider for ManualDirProvider {
    fn plugin_dir(&self) -> PathBuf {
        self.dir.clone()
    }

    fn subscribe(&self, listener: DirChangeListener) {
        self.listeners.push(listener);
    }
}
