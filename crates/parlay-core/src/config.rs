//! Environment Configuration Loader
//!
//! Loads environment variables from the canonical location: `/etc/parlay/environment`
//! and builds the [`EngineConfig`] shared by the engine and the CLI.
//!
//! ## Usage
//!
//! Call `load_environment()` early in main() before reading any config:
//!
//! ```rust
//! use parlay_core::config::{load_environment, EngineConfig};
//!
//! load_environment();
//! let config = EngineConfig::from_env();
//! assert!(config.max_expansion_depth > 0);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Alternative paths to check (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &["/etc/parlay/environment", "/etc/parlay.env", ".env"];

/// Directory scanned for `.plugin` modules when nothing else is configured
pub const DEFAULT_PLUGIN_DIR: &str = "./plugin";

/// Plugin expansion nesting allowed before an action is failed
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 8;

/// Seconds a plugin module gets to answer one request
pub const DEFAULT_PLUGIN_CALL_TIMEOUT: u64 = 30;

/// Engine wide settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory scanned (recursively) for plugin modules
    pub plugin_dir: PathBuf,
    /// Mirror every log entry into this file
    pub log_file: Option<PathBuf>,
    /// How deep plugin generated actions may expand into further plugin actions
    pub max_expansion_depth: usize,
    /// Timeout in seconds for actions that declare none, 0 = unbounded
    pub default_timeout: u64,
    /// Seconds a plugin module gets to answer one request
    pub plugin_call_timeout: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from(DEFAULT_PLUGIN_DIR),
            log_file: None,
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            default_timeout: 0,
            plugin_call_timeout: DEFAULT_PLUGIN_CALL_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Build from `PARLAY_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            plugin_dir: get_config_opt("PARLAY_PLUGIN_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.plugin_dir),
            log_file: get_config_opt("PARLAY_LOG_FILE").map(PathBuf::from),
            max_expansion_depth: get_config_int(
                "PARLAY_MAX_EXPANSION_DEPTH",
                DEFAULT_MAX_EXPANSION_DEPTH as i64,
            )
            .max(1) as usize,
            default_timeout: get_config_int("PARLAY_DEFAULT_TIMEOUT", 0).max(0) as u64,
            plugin_call_timeout: get_config_int(
                "PARLAY_PLUGIN_CALL_TIMEOUT",
                DEFAULT_PLUGIN_CALL_TIMEOUT as i64,
            )
            .max(1) as u64,
        }
    }

    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

/// Load environment variables from the canonical configuration file.
///
/// This function:
/// 1. Checks `$PARLAY_ENV_FILE` if set
/// 2. Checks `/etc/parlay/environment` (system-wide)
/// 3. Falls back to `.env` in current directory (development)
/// 4. Does NOT override existing environment variables
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("PARLAY_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded_count = 0;
            let mut skipped_count = 0;

            for line in content.lines() {
                let line = line.trim();

                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                if let Some((key, value)) = parse_env_line(line) {
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        loaded_count += 1;
                        debug!("Loaded: {}", key);
                    } else {
                        skipped_count += 1;
                        debug!("Skipped (already set): {}", key);
                    }
                }
            }

            info!(
                "Loaded {} environment variables from {} ({} skipped - already set)",
                loaded_count, path, skipped_count
            );

            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

/// Parse a single environment line into key-value pair.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    // Handle: KEY=VALUE, KEY="VALUE", KEY='VALUE', export KEY=VALUE
    let line = line.strip_prefix("export ").unwrap_or(line);
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an integer configuration value.
pub fn get_config_int(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("FOO=bar").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_quoted() {
        let (k, v) = parse_env_line("export FOO=\"bar baz\"").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar baz");
    }

    #[test]
    fn test_parse_env_line_empty() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("=value").is_none());
    }

    #[test]
    fn test_env_file_does_not_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "PARLAY_TEST_LOADED_ONLY=from-file").unwrap();
        writeln!(file, "PARLAY_TEST_ALREADY_SET=from-file").unwrap();
        std::env::set_var("PARLAY_TEST_ALREADY_SET", "from-env");

        let path = file.path().to_string_lossy().to_string();
        assert_eq!(try_load_env_file(&path), Some(path.clone()));
        assert_eq!(std::env::var("PARLAY_TEST_LOADED_ONLY").unwrap(), "from-file");
        assert_eq!(std::env::var("PARLAY_TEST_ALREADY_SET").unwrap(), "from-env");
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.plugin_dir, PathBuf::from("./plugin"));
        assert_eq!(config.max_expansion_depth, 8);
        assert_eq!(config.default_timeout, 0);
        assert!(config.log_file.is_none());
        assert_eq!(config.plugin_call_timeout, 30);
    }
}
