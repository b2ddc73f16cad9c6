//! File-name based format
//!
//! A file named `a_b-c_d` provides the identities `(a, b)` and `(c, d)`.
//! Only names containing `_` are plugin files. The file contents are never
//! read; versions come from a table supplied by the caller.

use crate::loader::{ArtifactFormat, LoadError, ProviderInstance, ProviderLoadError, ProviderLoader};
use dirplug_api::ProviderIdent;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Format deriving provider identities from file names
#[derive(Debug, Clone, Default)]
pub struct NameSegmentFormat {
    versions: HashMap<PathBuf, String>,
}

impl NameSegmentFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a version to the file at `path`
    pub fn with_version(mut self, path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        self.versions.insert(path.into(), version.into());
        self
    }

    fn file_name(path: &Path) -> Option<String> {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

impl ArtifactFormat for NameSegmentFormat {
    type Loader = NameSegmentLoader;

    fn is_valid_file(&self, path: &Path) -> bool {
        Self::file_name(path).is_some_and(|name| name.contains('_'))
    }

    fn create_loader(&self, path: &Path) -> Result<NameSegmentLoader, LoadError> {
        let name = Self::file_name(path).ok_or_else(|| LoadError::invalid(path, "no file name"))?;
        Ok(NameSegmentLoader::from_name(&name))
    }

    fn version_for(&self, path: &Path, _loader: &NameSegmentLoader) -> Option<String> {
        self.versions.get(path).cloned()
    }
}

/// Loader for [`NameSegmentFormat`] files
///
/// Loading a provider yields its [`ProviderIdent`].
#[derive(Debug, Clone)]
pub struct NameSegmentLoader {
    idents: Vec<ProviderIdent>,
}

impl NameSegmentLoader {
    pub fn from_name(name: &str) -> Self {
        let mut idents: Vec<ProviderIdent> = name
            .split('-')
            .filter_map(|segment| segment.split_once('_'))
            .filter_map(|(service, provider)| ProviderIdent::try_new(service, provider).ok())
            .collect();
        idents.sort();
        idents.dedup();
        Self { idents }
    }
}

impl ProviderLoader for NameSegmentLoader {
    fn provider_idents(&self) -> Vec<ProviderIdent> {
        self.idents.clone()
    }

    fn supports(&self, service: &str) -> bool {
        self.idents.iter().any(|ident| ident.service == service)
    }

    fn load(&self, service: &str, name: &str) -> Result<ProviderInstance, ProviderLoadError> {
        let ident = ProviderIdent::new(service, name);
        if !self.is_loader_for(&ident) {
            return Err(ProviderLoadError::UnknownProvider(ident));
        }
        Ok(Box::new(ident))
    }
}
