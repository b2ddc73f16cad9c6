//! Provider identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when building a [`ProviderIdent`] from untrusted input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentError {
    #[error("Provider service must not be empty")]
    EmptyService,

    #[error("Provider name must not be empty")]
    EmptyName,

    #[error("Expected 'service:name', got '{0}'")]
    Malformed(String),
}

/// Identifies the provider named `name` within the service category `service`
///
/// Equality and hashing are structural over both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderIdent {
    /// Service category (e.g. "WorkflowStep")
    pub service: String,

    /// Provider name within the service
    pub name: String,
}

impl ProviderIdent {
    /// Create a new identity.
    ///
    /// Both parts are expected to be non-empty; use [`ProviderIdent::try_new`]
    /// when the values come from an artifact.
    pub fn new(service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
        }
    }

    /// Create a new identity, rejecting empty or blank parts
    pub fn try_new(
        service: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, IdentError> {
        let ident = Self::new(service, name);
        ident.validate()?;
        Ok(ident)
    }

    /// Check that both parts are non-blank
    pub fn validate(&self) -> Result<(), IdentError> {
        if self.service.trim().is_empty() {
            return Err(IdentError::EmptyService);
        }
        if self.name.trim().is_empty() {
            return Err(IdentError::EmptyName);
        }
        Ok(())
    }
}

impl fmt::Display for ProviderIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.name)
    }
}

impl FromStr for ProviderIdent {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (service, name) = s
            .split_once(':')
            .ok_or_else(|| IdentError::Malformed(s.to_string()))?;
        Self::try_new(service, name)
    }
}
