use parlay_core::ActionError;
use parlay_plugins::PluginError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] parlay_core::Error),

    #[error("unknown action type [{0}]")]
    UnknownActionType(String),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Plugin(PluginError),

    #[error("Transport error on [{host}]: {message}")]
    Transport { host: String, message: String },

    #[error("Action timed out after {0}s")]
    Timeout(u64),

    #[error("{action}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key [{0}] not found")]
    KeyNotFound(String),

    #[error("Plugin expansion exceeded depth {0}")]
    ExpansionDepth(usize),

    #[error("Follow-up action [{action}] failed: {reason}")]
    FollowUp { action: String, reason: String },

    #[error("Deployment cancelled")]
    Cancelled,
}

impl From<PluginError> for EngineError {
    fn from(e: PluginError) -> Self {
        match e {
            PluginError::NoHandler(action) => EngineError::UnknownActionType(action),
            other => EngineError::Plugin(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn transport(host: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Transport {
            host: host.into(),
            message: message.into(),
        }
    }

    pub fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| EngineError::Io {
            action,
            path,
            source,
        }
    }
}
