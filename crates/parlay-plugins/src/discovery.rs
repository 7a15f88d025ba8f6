//! Plugin module discovery

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extension marking a file as a plugin module
pub const PLUGIN_EXTENSION: &str = "plugin";

/// Recursively collect `*.plugin` files below `dir`, sorted by path.
///
/// A missing directory yields no modules.
pub fn scan_plugin_dir(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!(path = %dir.display(), "Plugin directory does not exist");
        return Vec::new();
    }

    let mut modules: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable plugin path");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(PLUGIN_EXTENSION))
        .collect();

    modules.sort();
    debug!(path = %dir.display(), count = modules.len(), "Scanned plugin directory");
    modules
}
