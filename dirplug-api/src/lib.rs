//! dirplug-api: Shared types for the dirplug plugin scanner
//!
//! This crate defines the values exchanged between the scanner, the
//! directory providers and the artifact formats.

mod event;
mod ident;
mod manifest;
mod version;

pub use event::{DirChangeEvent, DirChangeType};
pub use ident::{IdentError, ProviderIdent};
pub use manifest::{PluginManifest, ProviderSpec};
pub use version::{PluginVersion, VersionComponent};
