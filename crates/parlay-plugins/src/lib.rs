//! Plugin system for parlay action types
//!
//! Action types that are not built into the engine are served by plugins
//! implementing [`ActionPlugin`]. Plugins either run as child processes found
//! under the plugin directory (`*.plugin`, see [`protocol`]) or are registered
//! in-process.

pub mod discovery;
pub mod error;
pub mod plugin;
pub mod process;
pub mod protocol;
pub mod registry;

pub use discovery::{scan_plugin_dir, PLUGIN_EXTENSION};
pub use error::{PluginError, Result};
pub use plugin::{ActionPlugin, FnPlugin};
pub use process::ProcessPlugin;
pub use registry::{ActionSummary, ModuleSummary, PluginRegistry, ResolvedAction};
