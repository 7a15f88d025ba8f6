//! Error types for parlay-core

use std::fmt;
use thiserror::Error;

/// Main error type for document loading and validation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid treasure map ({} issue(s)): {}", .0.len(), join_issues(.0))]
    Validation(Vec<ValidationIssue>),

    #[error("Unable to parse configuration as either yaml or json: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }
}

/// Why a single action cannot be projected onto a known variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("action type is empty")]
    EmptyType,

    #[error("command action requires `command` or `commands`")]
    MissingCommand,

    #[error("unknown package manager [{0}]")]
    UnknownPackageManager(String),

    #[error("unknown package operation [{0}]")]
    UnknownPackageOperation(String),

    #[error("package action has no packages")]
    MissingPackages,

    #[error("{0} action requires both `source` and `destination`")]
    MissingTransferPath(&'static str),

    #[error("key action requires `keyName`")]
    MissingKeyName,
}

/// One problem found while validating a TreasureMap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub deployment: String,
    /// Index of the offending action, if the issue is action scoped
    pub action: Option<usize>,
    pub reason: String,
}

impl ValidationIssue {
    pub fn deployment(deployment: &str, reason: impl Into<String>) -> Self {
        Self {
            deployment: deployment.to_string(),
            action: None,
            reason: reason.into(),
        }
    }

    pub fn action(deployment: &str, index: usize, reason: impl Into<String>) -> Self {
        Self {
            deployment: deployment.to_string(),
            action: Some(index),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            Some(index) => write!(
                f,
                "deployment [{}] action #{}: {}",
                self.deployment, index, self.reason
            ),
            None => write!(f, "deployment [{}]: {}", self.deployment, self.reason),
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
