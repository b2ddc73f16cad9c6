//! dirplug-host: Directory plugin scanner
//!
//! Discovers plugin files in a directory, caches their parsed loaders and
//! resolves provider identities to the file that provides them.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod formats;
pub mod loader;
pub mod provider;
pub mod scanner;
pub mod watcher;

pub use cache::{CacheError, FileCache};
pub use config::{ConfigError, ScannerConfig};
pub use loader::{
    ArtifactFormat, CloseableProvider, LoadError, ProviderInstance, ProviderLoadError,
    ProviderLoader,
};
pub use provider::{DirChangeListener, ManualDirProvider, PluginDirProvider, StaticDirProvider};
pub use scanner::{DirPluginScanner, ScanError};
pub use watcher::{WatchedDirProvider, WatcherError};
pub use dirplug_api::{DirChangeEvent, DirChangeType, PluginVersion, ProviderIdent};
