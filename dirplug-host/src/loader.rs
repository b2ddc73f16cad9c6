//! Loader traits for plugin artifacts
//!
//! An [`ArtifactFormat`] decides which directory entries are plugin files
//! and parses them into a [`ProviderLoader`]. The scanner is generic over
//! the format and never looks at artifact bytes itself.

use dirplug_api::ProviderIdent;
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A provider produced by a loader
pub type ProviderInstance = Box<dyn Any + Send>;

/// Errors that can occur while parsing an artifact into a loader
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid plugin {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

impl LoadError {
    /// Create an invalid artifact error
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while instantiating a provider from a loader
#[derive(Debug, Error)]
pub enum ProviderLoadError {
    #[error("Service not supported by this loader: {0}")]
    UnsupportedService(String),

    #[error("Provider not found: {0}")]
    UnknownProvider(ProviderIdent),

    #[error("Provider {0} is not of the requested type")]
    TypeMismatch(ProviderIdent),

    #[error("Failed to instantiate provider {ident}: {reason}")]
    Instantiation { ident: ProviderIdent, reason: String },
}

/// Parsed representation of one plugin artifact
pub trait ProviderLoader: Send + Sync {
    /// Identities of every provider this artifact offers
    fn provider_idents(&self) -> Vec<ProviderIdent>;

    /// Check whether this artifact offers `ident`
    fn is_loader_for(&self, ident: &ProviderIdent) -> bool {
        self.provider_idents().contains(ident)
    }

    /// Check whether this loader can produce providers for `service`
    fn supports(&self, service: &str) -> bool;

    /// Instantiate the provider `name` for `service`
    fn load(&self, service: &str, name: &str) -> Result<ProviderInstance, ProviderLoadError>;

    /// Instantiate a provider bound to a release action
    ///
    /// The default implementation has nothing to release.
    fn load_closeable(
        &self,
        service: &str,
        name: &str,
    ) -> Result<CloseableProvider<ProviderInstance>, ProviderLoadError> {
        self.load(service, name).map(CloseableProvider::unmanaged)
    }

    /// Instantiate a provider and downcast it to `T`
    fn load_as<T: 'static>(&self, service: &str, name: &str) -> Result<Box<T>, ProviderLoadError>
    where
        Self: Sized,
    {
        self.load(service, name)?
            .downcast::<T>()
            .map_err(|_| ProviderLoadError::TypeMismatch(ProviderIdent::new(service, name)))
    }
}

/// A plugin file format: validity predicate, loader factory and version extractor
pub trait ArtifactFormat: Send + Sync {
    type Loader: ProviderLoader;

    /// Format-specific check for plugin files
    fn is_valid_file(&self, path: &Path) -> bool;

    /// Supplementary filesystem-level filter
    fn accepts(&self, _path: &Path) -> bool {
        true
    }

    /// Parse one artifact
    fn create_loader(&self, path: &Path) -> Result<Self::Loader, LoadError>;

    /// Version used to resolve conflicts between artifacts offering the same provider
    fn version_for(&self, _path: &Path, _loader: &Self::Loader) -> Option<String> {
        None
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// A provider bound to a release action
///
/// The release action runs exactly once: on [`close`](Self::close), or when
/// the value is dropped, including during unwinding.
pub struct CloseableProvider<T> {
    provider: T,
    release: Option<ReleaseFn>,
}

impl<T> CloseableProvider<T> {
    /// Bind `provider` to `release`
    pub fn new(provider: T, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            provider,
            release: Some(Box::new(release)),
        }
    }

    /// Wrap a provider that needs no release
    pub fn unmanaged(provider: T) -> Self {
        Self {
            provider,
            release: None,
        }
    }

    pub fn provider(&self) -> &T {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut T {
        &mut self.provider
    }

    /// Run `f` with the provider, then release it
    pub fn with<R>(mut self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.provider)
    }

    /// Release the provider now
    pub fn close(self) {
        drop(self);
    }
}

impl<T> Drop for CloseableProvider<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CloseableProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseableProvider")
            .field("provider", &self.provider)
            .field("released", &self.release.is_none())
            .finish()
    }
}
