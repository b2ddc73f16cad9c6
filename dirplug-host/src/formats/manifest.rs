//! JSON manifest format
//!
//! Plugin files are `*.plugin.json` documents (see [`PluginManifest`]).
//! Each declared provider loads as a [`ScriptProvider`] whose script path
//! is resolved relative to the manifest.

use crate::loader::{
    ArtifactFormat, CloseableProvider, LoadError, ProviderInstance, ProviderLoadError,
    ProviderLoader,
};
use dirplug_api::{PluginManifest, ProviderIdent};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name suffix of plugin manifests
pub const MANIFEST_SUFFIX: &str = ".plugin.json";

/// Format for `*.plugin.json` manifests
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestFormat;

impl ArtifactFormat for ManifestFormat {
    type Loader = ManifestLoader;

    fn is_valid_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| {
                name.ends_with(MANIFEST_SUFFIX) && name.len() > MANIFEST_SUFFIX.len()
            })
    }

    fn accepts(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn create_loader(&self, path: &Path) -> Result<ManifestLoader, LoadError> {
        ManifestLoader::read(path)
    }

    fn version_for(&self, _path: &Path, loader: &ManifestLoader) -> Option<String> {
        loader.manifest.version.clone()
    }
}

/// Loader for one plugin manifest
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    path: PathBuf,
    manifest: PluginManifest,
    idents: Vec<ProviderIdent>,
}

impl ManifestLoader {
    /// Read and validate the manifest at `path`
    pub fn read(path: &Path) -> Result<Self, LoadError> {
        let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: PluginManifest =
            serde_json::from_str(&contents).map_err(|source| LoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let idents = manifest
            .idents()
            .map_err(|e| LoadError::invalid(path, e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            idents,
        })
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn instantiate(&self, ident: ProviderIdent) -> Result<ScriptProvider, ProviderLoadError> {
        let spec = self
            .manifest
            .find(&ident)
            .ok_or_else(|| ProviderLoadError::UnknownProvider(ident.clone()))?;

        let script = match &spec.script {
            Some(script) => {
                let base = self.path.parent().unwrap_or_else(|| Path::new("."));
                let resolved = base.join(script);
                if !resolved.is_file() {
                    return Err(ProviderLoadError::Instantiation {
                        ident,
                        reason: format!("script not found: {}", resolved.display()),
                    });
                }
                Some(resolved)
            }
            None => None,
        };

        Ok(ScriptProvider {
            plugin: self.manifest.name.clone(),
            ident,
            script,
            properties: spec.properties.clone(),
        })
    }
}

impl ProviderLoader for ManifestLoader {
    fn provider_idents(&self) -> Vec<ProviderIdent> {
        self.idents.clone()
    }

    fn supports(&self, service: &str) -> bool {
        self.idents.iter().any(|ident| ident.service == service)
    }

    fn load(&self, service: &str, name: &str) -> Result<ProviderInstance, ProviderLoadError> {
        let provider = self.instantiate(ProviderIdent::new(service, name))?;
        Ok(Box::new(provider))
    }

    fn load_closeable(
        &self,
        service: &str,
        name: &str,
    ) -> Result<CloseableProvider<ProviderInstance>, ProviderLoadError> {
        let provider = self.instantiate(ProviderIdent::new(service, name))?;
        let ident = provider.ident.clone();
        tracing::debug!(ident = %ident, manifest = %self.path.display(), "Loaded script provider");

        Ok(CloseableProvider::new(
            Box::new(provider) as ProviderInstance,
            move || tracing::debug!(ident = %ident, "Released script provider"),
        ))
    }
}

/// A provider declared by a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptProvider {
    /// Name of the plugin declaring it
    pub plugin: String,
    pub ident: ProviderIdent,
    /// Script path joined onto the manifest's directory, checked to exist
    pub script: Option<PathBuf>,
    pub properties: BTreeMap<String, String>,
}
