//! Artifact cache keyed by file path
//!
//! Keeps the parsed loader of every plugin file together with the file's
//! modification time at load time. An entry is reused only while the file
//! still exists with the same mtime; content changes that keep the mtime
//! are not detected.

use crate::loader::LoadError;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    #[error("Failed to read metadata of {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Staleness fingerprint recorded when an entry is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    exists: bool,
}

impl Fingerprint {
    fn read(path: &Path) -> io::Result<Self> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Self {
                modified: meta.modified().ok(),
                exists: true,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self {
                modified: None,
                exists: false,
            }),
            Err(e) => Err(e),
        }
    }
}

struct CacheEntry<L> {
    loader: Arc<L>,
    fingerprint: Fingerprint,
}

/// Cache of parsed loaders, one per plugin file
pub struct FileCache<L> {
    entries: HashMap<PathBuf, CacheEntry<L>>,
}

impl<L> FileCache<L> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Return the cached loader for `path`, or create it with `factory`
    ///
    /// A cached loader is returned only if the file's current mtime matches
    /// the one recorded when the entry was created. Otherwise the entry is
    /// replaced with a fresh one.
    pub fn get_or_load<F>(&mut self, path: &Path, factory: F) -> Result<Arc<L>, CacheError>
    where
        F: FnOnce(&Path) -> Result<L, LoadError>,
    {
        let current = Fingerprint::read(path).map_err(|source| CacheError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;

        if !current.exists {
            self.entries.remove(path);
            return Err(CacheError::NotFound(path.to_path_buf()));
        }

        if let Some(entry) = self.entries.get(path) {
            if entry.fingerprint == current {
                return Ok(entry.loader.clone());
            }
        }

        self.entries.remove(path);
        let loader = Arc::new(factory(path).map_err(|source| CacheError::Load {
            path: path.to_path_buf(),
            source,
        })?);

        tracing::debug!(path = %path.display(), "Cached plugin loader");
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                loader: loader.clone(),
                fingerprint: current,
            },
        );
        Ok(loader)
    }

    /// Check whether the entry for `path` is missing or out of date
    pub fn is_stale(&self, path: &Path) -> bool {
        let Some(entry) = self.entries.get(path) else {
            return true;
        };
        match Fingerprint::read(path) {
            Ok(current) => !current.exists || current != entry.fingerprint,
            Err(_) => true,
        }
    }

    /// Drop the entry for `path`
    pub fn invalidate(&mut self, path: &Path) {
        if self.entries.remove(path).is_some() {
            tracing::debug!(path = %path.display(), "Invalidated plugin loader");
        }
    }

    /// Cached loader for `path` without checking staleness
    pub fn get(&self, path: &Path) -> Option<Arc<L>> {
        self.entries.get(path).map(|e| e.loader.clone())
    }

    /// Keep only the entries whose path satisfies `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&Path) -> bool) {
        self.entries.retain(|path, _| keep(path));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<L> Default for FileCache<L> {
    fn default() -> Self {
        Self::new()
    }
}
