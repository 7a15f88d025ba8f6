use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Action [{0}] does not exist or has no plugin associated with it")]
    NoHandler(String),

    #[error("Action [{action}] is served by both [{first}] and [{second}]")]
    Collision {
        action: String,
        first: String,
        second: String,
    },

    #[error("No plugin module [{0}] has been discovered")]
    UnknownModule(String),

    #[error("Unable to open Plugin [{path}]: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to read function {entry} from Plugin [{module}]: {reason}")]
    EntryPoint {
        module: String,
        entry: &'static str,
        reason: String,
    },

    #[error("Plugin [{module}] sent a malformed response: {reason}")]
    Protocol { module: String, reason: String },

    #[error("Plugin [{module}] is no longer running: {reason}")]
    ModuleExited { module: String, reason: String },

    #[error("Plugin [{module}] did not answer {entry} within {seconds}s")]
    Timeout {
        module: String,
        entry: &'static str,
        seconds: u64,
    },

    #[error("Plugin [{module}] panicked: {message}")]
    Panicked { module: String, message: String },

    /// Error reported by the plugin itself
    #[error("{0}")]
    Plugin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PluginError>;

impl PluginError {
    pub fn entry_point(module: impl Into<String>, entry: &'static str, reason: impl Into<String>) -> Self {
        PluginError::EntryPoint {
            module: module.into(),
            entry,
            reason: reason.into(),
        }
    }

    pub fn protocol(module: impl Into<String>, reason: impl Into<String>) -> Self {
        PluginError::Protocol {
            module: module.into(),
            reason: reason.into(),
        }
    }
}
