//! Directory plugin scanner
//!
//! Maps provider identities to the plugin files that provide them. The
//! index is rebuilt from a fresh directory listing whenever the directory
//! provider reports a change, or when the configured rescan interval has
//! elapsed since the last scan. Parsed loaders are kept in a [`FileCache`]
//! so unchanged files are not parsed again.
//!
//! When several files provide the same identity, the one with the highest
//! version wins. Files are visited in file-name order and a later file wins
//! ties, so the outcome is the same on every scan.

use crate::cache::{CacheError, FileCache};
use crate::config::ScannerConfig;
use crate::loader::{
    ArtifactFormat, CloseableProvider, ProviderInstance, ProviderLoadError, ProviderLoader,
};
use crate::provider::PluginDirProvider;
use dirplug_api::{DirChangeEvent, PluginVersion, ProviderIdent};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur during scanning and provider loading
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Plugin directory unavailable: {path}: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No plugin provides {0}")]
    NotFound(ProviderIdent),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    ProviderLoad(#[from] ProviderLoadError),
}

/// One (identity, file, version) triple collected during a scan
#[derive(Debug, Clone)]
pub struct Candidate {
    pub ident: ProviderIdent,
    pub path: PathBuf,
    pub version: Option<PluginVersion>,
}

/// Pick one file per identity
///
/// Candidates are visited in order; a candidate replaces the current winner
/// when its version is greater than or equal to the winner's. A missing
/// version orders below any present one.
pub fn resolve_conflicts(
    candidates: impl IntoIterator<Item = Candidate>,
) -> HashMap<ProviderIdent, PathBuf> {
    let mut winners: HashMap<ProviderIdent, (PathBuf, Option<PluginVersion>)> = HashMap::new();

    for candidate in candidates {
        match winners.entry(candidate.ident) {
            Entry::Vacant(slot) => {
                slot.insert((candidate.path, candidate.version));
            }
            Entry::Occupied(mut slot) => {
                let (current_path, current_version) = slot.get();
                if candidate.version >= *current_version {
                    tracing::debug!(
                        ident = %slot.key(),
                        replaced = %current_path.display(),
                        winner = %candidate.path.display(),
                        "Resolved plugin conflict"
                    );
                    slot.insert((candidate.path, candidate.version));
                }
            }
        }
    }

    winners
        .into_iter()
        .map(|(ident, (path, _))| (ident, path))
        .collect()
}

struct ScanState<L> {
    index: HashMap<ProviderIdent, PathBuf>,
    cache: FileCache<L>,
    last_scan: Option<Instant>,
    scan_count: u64,
}

/// Scanner resolving provider identities to plugin files in one directory
pub struct DirPluginScanner<F: ArtifactFormat> {
    dir_provider: Arc<dyn PluginDirProvider>,
    format: F,
    rescan_interval: Duration,
    dirty: Arc<AtomicBool>,
    state: Mutex<ScanState<F::Loader>>,
}

impl<F: ArtifactFormat> DirPluginScanner<F> {
    /// Create a scanner and subscribe it to `dir_provider`'s change notifications
    pub fn new(dir_provider: Arc<dyn PluginDirProvider>, format: F, config: ScannerConfig) -> Self {
        let dirty = Arc::new(AtomicBool::new(false));

        let flag = dirty.clone();
        dir_provider.subscribe(Box::new(move |_event: &DirChangeEvent| {
            flag.store(true, Ordering::Release);
        }));

        Self {
            dir_provider,
            format,
            rescan_interval: config.rescan_interval(),
            dirty,
            state: Mutex::new(ScanState {
                index: HashMap::new(),
                cache: FileCache::new(),
                last_scan: None,
                scan_count: 0,
            }),
        }
    }

    /// File currently providing `ident`
    pub fn resolve(&self, ident: &ProviderIdent) -> Result<Option<PathBuf>, ScanError> {
        let mut state = self.lock_state();
        self.ensure_fresh(&mut state)?;
        Ok(state.index.get(ident).cloned())
    }

    /// Every identity currently provided by some plugin file
    pub fn list_identities(&self) -> Result<HashSet<ProviderIdent>, ScanError> {
        let mut state = self.lock_state();
        self.ensure_fresh(&mut state)?;
        Ok(state.index.keys().cloned().collect())
    }

    /// Check whether a previously resolved `file` should no longer be used for `ident`
    ///
    /// True if the file is gone, was modified since it was loaded, or another
    /// file now provides `ident`. A rescan happens only when one is due; if it
    /// fails, the previous index is consulted.
    pub fn is_expired(&self, ident: &ProviderIdent, file: &Path) -> bool {
        if !file.exists() {
            return true;
        }

        let mut state = self.lock_state();
        if state.cache.is_stale(file) {
            return true;
        }

        if let Err(e) = self.ensure_fresh(&mut state) {
            tracing::warn!(error = %e, "Rescan failed, using previous plugin index");
        }
        state.index.get(ident).map(PathBuf::as_path) != Some(file)
    }

    /// Loader of the file currently providing `ident`
    ///
    /// If that file disappeared since the last scan, the directory is
    /// rescanned once and the lookup retried.
    pub fn loader_for(&self, ident: &ProviderIdent) -> Result<Option<Arc<F::Loader>>, ScanError> {
        let mut state = self.lock_state();
        self.ensure_fresh(&mut state)?;

        match self.cached_loader(&mut state, ident) {
            Err(ScanError::Cache(CacheError::NotFound(path))) => {
                tracing::debug!(path = %path.display(), "Indexed plugin file vanished, rescanning");
                self.mark_dirty();
                self.rescan_locked(&mut state)?;
                match self.cached_loader(&mut state, ident) {
                    Err(ScanError::Cache(CacheError::NotFound(_))) => {
                        self.mark_dirty();
                        Ok(None)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Every indexed identity with its file and loader, from a single scan
    ///
    /// Sorted by identity.
    pub fn snapshot(&self) -> Result<Vec<(ProviderIdent, PathBuf, Arc<F::Loader>)>, ScanError> {
        let mut state = self.lock_state();
        self.ensure_fresh(&mut state)?;

        let mut entries: Vec<_> = state
            .index
            .iter()
            .filter_map(|(ident, path)| {
                let loader = state.cache.get(path)?;
                Some((ident.clone(), path.clone(), loader))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Instantiate the provider for `ident`
    pub fn load_provider(&self, ident: &ProviderIdent) -> Result<ProviderInstance, ScanError> {
        let loader = self.supporting_loader(ident)?;
        Ok(loader.load(&ident.service, &ident.name)?)
    }

    /// Instantiate the provider for `ident`, bound to its release action
    pub fn load_closeable(
        &self,
        ident: &ProviderIdent,
    ) -> Result<CloseableProvider<ProviderInstance>, ScanError> {
        let loader = self.supporting_loader(ident)?;
        Ok(loader.load_closeable(&ident.service, &ident.name)?)
    }

    /// Rescan now, regardless of notifications and interval
    pub fn rescan(&self) -> Result<(), ScanError> {
        let mut state = self.lock_state();
        self.rescan_locked(&mut state)
    }

    /// Force the next query to rescan
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Number of completed directory scans
    pub fn scan_count(&self) -> u64 {
        self.lock_state().scan_count
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.dir_provider.plugin_dir()
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    fn supporting_loader(&self, ident: &ProviderIdent) -> Result<Arc<F::Loader>, ScanError> {
        let loader = self
            .loader_for(ident)?
            .ok_or_else(|| ScanError::NotFound(ident.clone()))?;
        if !loader.supports(&ident.service) {
            return Err(ProviderLoadError::UnsupportedService(ident.service.clone()).into());
        }
        Ok(loader)
    }

    fn cached_loader(
        &self,
        state: &mut ScanState<F::Loader>,
        ident: &ProviderIdent,
    ) -> Result<Option<Arc<F::Loader>>, ScanError> {
        let Some(path) = state.index.get(ident).cloned() else {
            return Ok(None);
        };
        let loader = state
            .cache
            .get_or_load(&path, |p| self.format.create_loader(p))?;
        Ok(Some(loader))
    }

    fn lock_state(&self) -> MutexGuard<'_, ScanState<F::Loader>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_rescan(&self, state: &ScanState<F::Loader>) -> bool {
        if self.dirty.load(Ordering::Acquire) {
            return true;
        }
        match state.last_scan {
            None => true,
            Some(_) if self.rescan_interval.is_zero() => true,
            Some(at) => at.elapsed() > self.rescan_interval,
        }
    }

    fn ensure_fresh(&self, state: &mut ScanState<F::Loader>) -> Result<(), ScanError> {
        if self.should_rescan(state) {
            self.rescan_locked(state)?;
        }
        Ok(())
    }

    fn rescan_locked(&self, state: &mut ScanState<F::Loader>) -> Result<(), ScanError> {
        // Cleared before listing so that changes reported mid-scan trigger another scan.
        let was_dirty = self.dirty.swap(false, Ordering::AcqRel);
        let started = Instant::now();
        let dir = self.dir_provider.plugin_dir();

        let files = match self.list_candidates(&dir) {
            Ok(files) => files,
            Err(e) => {
                if was_dirty {
                    self.dirty.store(true, Ordering::Release);
                }
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to scan plugin directory");
                return Err(e);
            }
        };

        let mut candidates = Vec::new();
        for path in &files {
            let loader = match state
                .cache
                .get_or_load(path, |p| self.format.create_loader(p))
            {
                Ok(loader) => loader,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping plugin file");
                    state.cache.invalidate(path);
                    continue;
                }
            };

            let version = self
                .format
                .version_for(path, &loader)
                .map(|v| PluginVersion::parse(&v));
            for ident in loader.provider_idents() {
                candidates.push(Candidate {
                    ident,
                    path: path.clone(),
                    version: version.clone(),
                });
            }
        }

        let listed: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();
        state.cache.retain(|path| listed.contains(path));

        state.index = resolve_conflicts(candidates);
        state.last_scan = Some(started);
        state.scan_count += 1;

        tracing::debug!(
            dir = %dir.display(),
            files = files.len(),
            providers = state.index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scanned plugin directory"
        );
        Ok(())
    }

    /// Plugin files in `dir`, in file-name order
    fn list_candidates(&self, dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(dir = %dir.display(), "Plugin directory does not exist");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(ScanError::DirectoryUnavailable {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => paths.push(entry.path()),
                Err(e) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %e,
                        "Failed to read directory entry"
                    );
                }
            }
        }

        paths.sort();
        paths.retain(|path| self.format.is_valid_file(path) && self.format.accepts(path));
        Ok(paths)
    }
}
