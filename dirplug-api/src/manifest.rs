//! Plugin manifest schema
//!
//! A manifest is a JSON document describing the providers shipped by one
//! plugin artifact:
//!
//! ```json
//! {
//!   "name": "acme-tools",
//!   "version": "1.4.2",
//!   "providers": [
//!     { "service": "WorkflowStep", "name": "acme-copy", "script": "copy.sh" }
//!   ]
//! }
//! ```

use crate::{IdentError, PluginVersion, ProviderIdent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Manifest of a plugin artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name (informational)
    pub name: String,

    /// Plugin version, used to resolve conflicts between artifacts
    #[serde(default)]
    pub version: Option<String>,

    /// Short description
    #[serde(default)]
    pub description: Option<String>,

    /// Providers offered by this plugin
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
}

/// One provider declared in a manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Service category
    pub service: String,

    /// Provider name within the service
    pub name: String,

    /// Script or entry point, relative to the manifest
    #[serde(default)]
    pub script: Option<String>,

    /// Static provider properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl PluginManifest {
    /// Create a manifest with no providers
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            providers: Vec::new(),
        }
    }

    /// Set the version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add a provider
    pub fn provider(mut self, provider: ProviderSpec) -> Self {
        self.providers.push(provider);
        self
    }

    /// Parsed version, if any
    pub fn plugin_version(&self) -> Option<PluginVersion> {
        self.version.as_deref().map(PluginVersion::parse)
    }

    /// Validated identities of every declared provider
    pub fn idents(&self) -> Result<Vec<ProviderIdent>, IdentError> {
        self.providers.iter().map(ProviderSpec::ident).collect()
    }

    /// Find the provider declared for `ident`
    pub fn find(&self, ident: &ProviderIdent) -> Option<&ProviderSpec> {
        self.providers
            .iter()
            .find(|p| p.service == ident.service && p.name == ident.name)
    }
}

impl ProviderSpec {
    pub fn new(service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            script: None,
            properties: BTreeMap::new(),
        }
    }

    /// Set the script entry point
    pub fn script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Add a property
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn ident(&self) -> Result<ProviderIdent, IdentError> {
        ProviderIdent::try_new(self.service.clone(), self.name.clone())
    }
}
