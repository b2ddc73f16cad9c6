//! Default plugin directory locations

use std::path::PathBuf;

/// Get default plugin directories for the current platform
///
/// User-local data directory first, then `./plugins`.
pub fn default_plugin_dirs(app_name: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(data_dir) = dirs::data_local_dir() {
        dirs.push(data_dir.join(app_name).join("plugins"));
    }

    dirs.push(PathBuf::from("plugins"));

    dirs
}

/// First default plugin directory that exists, or the user-local one
pub fn default_plugin_dir(app_name: &str) -> PathBuf {
    let candidates = default_plugin_dirs(app_name);
    candidates
        .iter()
        .find(|dir| dir.is_dir())
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_else(|| PathBuf::from("plugins"))
}
